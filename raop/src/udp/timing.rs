//! Timing Endpoint (§4.4): reflects timing-request packets with a
//! three-timestamp response so the receiver can measure round-trip
//! latency against the sender's clock.

use std::net::IpAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tracing::debug;

use crate::packet::TimingPacket;

/// UDP listener bound to an ephemeral local port, reflecting every
/// well-formed timing request it receives.
pub struct TimingEndpoint {
    // ---
    socket: Arc<UdpSocket>,
}

impl TimingEndpoint {
    // ---
    pub async fn bind(local_addr: IpAddr) -> std::io::Result<Self> {
        // ---
        let socket = UdpSocket::bind((local_addr, 0)).await?;
        Ok(Self {
            socket: Arc::new(socket),
        })
    }

    /// The ephemeral port this endpoint bound to, reported to the
    /// Orchestrator so it can be passed to the receiver via SETUP.
    pub fn local_port(&self) -> std::io::Result<u16> {
        // ---
        Ok(self.socket.local_addr()?.port())
    }

    /// Runs the reflect loop forever. Intended to be driven by
    /// `tokio::spawn` and stopped by aborting the resulting handle —
    /// this endpoint has no internal cancellation state of its own.
    pub async fn run(self) {
        // ---
        let mut buf = [0u8; 2048];
        loop {
            let (len, addr) = match self.socket.recv_from(&mut buf).await {
                Ok(pair) => pair,
                Err(e) => {
                    debug!("timing endpoint recv error: {e}");
                    continue;
                }
            };

            let request = match TimingPacket::decode(&buf[..len]) {
                Ok(req) => req,
                Err(e) => {
                    debug!("dropping malformed timing packet from {addr}: {e}");
                    continue;
                }
            };

            let response = TimingPacket::reflect(&request);
            if let Err(e) = self.socket.send_to(&response.encode(), addr).await {
                debug!("timing endpoint send error to {addr}: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use std::net::Ipv4Addr;

    #[tokio::test]
    async fn reflects_a_well_formed_request() {
        // ---
        let endpoint = TimingEndpoint::bind(IpAddr::V4(Ipv4Addr::LOCALHOST))
            .await
            .expect("bind should succeed");
        let port = endpoint.local_port().expect("local_port");

        let handle = tokio::spawn(endpoint.run());

        let client = UdpSocket::bind("127.0.0.1:0").await.expect("client bind");
        let request = TimingPacket {
            proto: 0x80,
            packet_type: 0x52,
            origin: 0xAABB_CCDD,
            receive: 0,
            transmit: 0,
        };
        client
            .send_to(&request.encode(), (Ipv4Addr::LOCALHOST, port))
            .await
            .expect("send request");

        let mut buf = [0u8; 64];
        let (len, _) = tokio::time::timeout(std::time::Duration::from_secs(1), client.recv_from(&mut buf))
            .await
            .expect("should receive a response before the timeout")
            .expect("recv_from should succeed");

        let response = TimingPacket::decode(&buf[..len]).expect("response should decode");
        assert_eq!(response.origin, request.origin);
        assert_eq!(response.packet_type, crate::packet::TIMING_RESPONSE_TYPE);

        handle.abort();
    }

    #[tokio::test]
    async fn malformed_request_is_dropped_silently() {
        // ---
        let endpoint = TimingEndpoint::bind(IpAddr::V4(Ipv4Addr::LOCALHOST))
            .await
            .expect("bind should succeed");
        let port = endpoint.local_port().expect("local_port");
        let handle = tokio::spawn(endpoint.run());

        let client = UdpSocket::bind("127.0.0.1:0").await.expect("client bind");
        client
            .send_to(&[0u8; 4], (Ipv4Addr::LOCALHOST, port))
            .await
            .expect("send short packet");

        let mut buf = [0u8; 64];
        let result = tokio::time::timeout(
            std::time::Duration::from_millis(200),
            client.recv_from(&mut buf),
        )
        .await;
        assert!(result.is_err(), "no response should be sent for a malformed request");

        handle.abort();
    }
}
