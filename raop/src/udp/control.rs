//! Control Endpoint (§4.5): emits a sync packet every second and serves
//! retransmit requests from the backlog, both over the same UDP socket.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::backlog::SharedBacklog;
use crate::context::SharedContext;
use crate::packet::{RetransmitRequest, SyncPacket, SYNC_FLAGS_FIRST, SYNC_FLAGS_SUBSEQUENT};
use crate::timestamp::ts2ntp;

const SYNC_INTERVAL: Duration = Duration::from_secs(1);

/// UDP endpoint bound to an ephemeral local port, handling both the
/// periodic sync emission and inbound retransmit requests.
pub struct ControlEndpoint {
    // ---
    socket: Arc<UdpSocket>,
    context: SharedContext,
    backlog: SharedBacklog,
    metrics: Option<raop_common::MetricsContext>,
    task: Option<JoinHandle<()>>,
}

impl ControlEndpoint {
    // ---
    pub async fn bind(
        local_addr: IpAddr,
        context: SharedContext,
        backlog: SharedBacklog,
        metrics: Option<raop_common::MetricsContext>,
    ) -> std::io::Result<Self> {
        // ---
        let socket = UdpSocket::bind((local_addr, 0)).await?;
        Ok(Self {
            socket: Arc::new(socket),
            context,
            backlog,
            metrics,
            task: None,
        })
    }

    pub fn local_port(&self) -> std::io::Result<u16> {
        // ---
        Ok(self.socket.local_addr()?.port())
    }

    /// Starts the combined sync+retransmit task against `remote`. Stops
    /// and replaces any previously running task, so `start` after `stop`
    /// restarts cleanly (§4.5: "must be cancellable and restartable
    /// once").
    pub fn start(&mut self, remote: SocketAddr) {
        // ---
        self.stop();

        let socket = Arc::clone(&self.socket);
        let context = Arc::clone(&self.context);
        let backlog = Arc::clone(&self.backlog);
        let metrics = self.metrics.clone();

        self.task = Some(tokio::spawn(run(socket, context, backlog, remote, metrics)));
    }

    /// Cancels the running task, if any. Idempotent.
    pub fn stop(&mut self) {
        // ---
        if let Some(handle) = self.task.take() {
            handle.abort();
        }
    }
}

async fn run(
    socket: Arc<UdpSocket>,
    context: SharedContext,
    backlog: SharedBacklog,
    remote: SocketAddr,
    metrics: Option<raop_common::MetricsContext>,
) {
    // ---
    let mut interval = tokio::time::interval(SYNC_INTERVAL);
    let mut first = true;
    let mut buf = vec![0u8; 2048];

    loop {
        tokio::select! {
            _ = interval.tick() => {
                send_sync(&socket, &context, remote, first, metrics.as_ref()).await;
                first = false;
            }
            recv = socket.recv_from(&mut buf) => {
                match recv {
                    Ok((len, addr)) => {
                        handle_datagram(&socket, &backlog, &buf[..len], addr, metrics.as_ref()).await;
                    }
                    Err(e) => {
                        warn!("control endpoint recv error: {e}");
                    }
                }
            }
        }
    }
}

async fn send_sync(
    socket: &UdpSocket,
    context: &SharedContext,
    remote: SocketAddr,
    first: bool,
    metrics: Option<&raop_common::MetricsContext>,
) {
    // ---
    let (rtptime, latency, sample_rate) = {
        let ctx = context.lock().expect("context mutex poisoned");
        (ctx.rtptime(), ctx.latency, ctx.sample_rate)
    };

    let packet = SyncPacket {
        flags: if first {
            SYNC_FLAGS_FIRST
        } else {
            SYNC_FLAGS_SUBSEQUENT
        },
        rtp_timestamp_minus_latency: rtptime.wrapping_sub(latency),
        current_time: ts2ntp(rtptime as u64, sample_rate),
        rtp_timestamp: rtptime,
    };

    if let Err(e) = socket.send_to(&packet.encode(), remote).await {
        warn!("failed to send sync packet to {remote}: {e}");
        return;
    }

    if let Some(m) = metrics {
        m.sync_packets_sent_total.inc();
    }
}

async fn handle_datagram(
    socket: &UdpSocket,
    backlog: &SharedBacklog,
    data: &[u8],
    addr: SocketAddr,
    metrics: Option<&raop_common::MetricsContext>,
) {
    // ---
    let request = match RetransmitRequest::decode(data) {
        Ok(req) => req,
        Err(e) => {
            debug!("dropping malformed or unhandled control datagram from {addr}: {e}");
            return;
        }
    };

    for seqno in request.sequence_numbers() {
        let original = {
            let backlog = backlog.lock().expect("backlog mutex poisoned");
            backlog.get(seqno).map(<[u8]>::to_vec)
        };

        let Some(original) = original else {
            debug!("packet {seqno} not in backlog, skipping retransmit");
            if let Some(m) = metrics {
                m.retransmit_misses_total.inc();
            }
            continue;
        };

        let response = build_retransmit_response(seqno, &original);
        if let Err(e) = socket.send_to(&response, addr).await {
            warn!("failed to send retransmit response to {addr}: {e}");
            continue;
        }

        if let Some(m) = metrics {
            m.retransmits_served_total.inc();
        }
    }
}

/// `0x80 0xD6 seq_hi seq_lo` followed by the original packet in full
/// (§4.5). The duplicated sequence field is by design, not a bug.
fn build_retransmit_response(seqno: u16, original: &[u8]) -> Vec<u8> {
    // ---
    let mut response = Vec::with_capacity(4 + original.len());
    response.push(0x80);
    response.push(0xD6);
    response.extend_from_slice(&seqno.to_be_bytes());
    response.extend_from_slice(original);
    response
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::backlog::PacketBacklog;
    use crate::context::SessionContext;
    use std::net::Ipv4Addr;
    use std::sync::Mutex;

    fn localhost() -> IpAddr {
        // ---
        IpAddr::V4(Ipv4Addr::LOCALHOST)
    }

    #[tokio::test]
    async fn serves_a_retransmit_request_byte_for_byte() {
        // ---
        let context = Arc::new(Mutex::new(SessionContext::new()));
        let backlog = Arc::new(Mutex::new(PacketBacklog::default()));

        let original_5 = vec![0x80, 0x60, 0x00, 0x05, 1, 2, 3];
        let original_6 = vec![0x80, 0x60, 0x00, 0x06, 4, 5, 6];
        let original_7 = vec![0x80, 0x60, 0x00, 0x07, 7, 8, 9];
        {
            let mut b = backlog.lock().unwrap();
            b.insert(5, original_5.clone());
            b.insert(6, original_6.clone());
            b.insert(7, original_7.clone());
        }

        let mut endpoint = ControlEndpoint::bind(localhost(), context, backlog, None)
            .await
            .expect("bind should succeed");
        let port = endpoint.local_port().expect("local_port");

        let client = UdpSocket::bind("127.0.0.1:0").await.expect("client bind");
        let client_addr = client.local_addr().expect("client addr");
        endpoint.start(client_addr);

        let request = RetransmitRequest {
            lost_seqno: 5,
            lost_packets: 3,
        };
        client
            .send_to(&request.encode(), (Ipv4Addr::LOCALHOST, port))
            .await
            .expect("send request");

        let mut responses = Vec::new();
        for _ in 0..3 {
            let mut buf = [0u8; 256];
            let (len, _) = tokio::time::timeout(
                std::time::Duration::from_secs(1),
                client.recv_from(&mut buf),
            )
            .await
            .expect("should receive a retransmit response")
            .expect("recv_from should succeed");
            responses.push(buf[..len].to_vec());
        }

        for (resp, original) in responses.iter().zip([&original_5, &original_6, &original_7]) {
            assert_eq!(resp[0], 0x80);
            assert_eq!(resp[1], 0xD6);
            assert_eq!(&resp[4..], original.as_slice());
        }

        endpoint.stop();
    }

    #[tokio::test]
    async fn backlog_miss_produces_no_response() {
        // ---
        let context = Arc::new(Mutex::new(SessionContext::new()));
        let backlog = Arc::new(Mutex::new(PacketBacklog::new(10)));
        for seq in 1000u16..2000 {
            backlog.lock().unwrap().insert(seq, vec![0u8]);
        }

        let mut endpoint = ControlEndpoint::bind(localhost(), context, backlog, None)
            .await
            .expect("bind should succeed");
        let port = endpoint.local_port().expect("local_port");

        let client = UdpSocket::bind("127.0.0.1:0").await.expect("client bind");
        let client_addr = client.local_addr().expect("client addr");
        endpoint.start(client_addr);

        let request = RetransmitRequest {
            lost_seqno: 2000,
            lost_packets: 1,
        };
        client
            .send_to(&request.encode(), (Ipv4Addr::LOCALHOST, port))
            .await
            .expect("send request");

        let mut buf = [0u8; 256];
        let result = tokio::time::timeout(
            std::time::Duration::from_millis(300),
            client.recv_from(&mut buf),
        )
        .await;
        assert!(result.is_err(), "no retransmit response should arrive for a backlog miss");

        endpoint.stop();
    }
}
