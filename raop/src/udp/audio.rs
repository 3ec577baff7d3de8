//! Audio Sender (§4.6): a UDP "connected" endpoint that sends RTP audio
//! packets to the receiver's `server_port`.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::net::UdpSocket;
use tracing::error;

/// Connected UDP sender for audio packets. Closes itself on the first
/// send error; the streaming loop observes the closure on its next
/// `send` call rather than the error propagating out of this type.
pub struct AudioSender {
    // ---
    socket: UdpSocket,
    closed: AtomicBool,
}

impl AudioSender {
    // ---
    pub async fn connect(remote: SocketAddr) -> std::io::Result<Self> {
        // ---
        let socket = UdpSocket::bind((
            if remote.is_ipv4() {
                std::net::IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED)
            } else {
                std::net::IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED)
            },
            0,
        ))
        .await?;
        socket.connect(remote).await?;
        Ok(Self {
            socket,
            closed: AtomicBool::new(false),
        })
    }

    /// `true` once a send error has closed this sender.
    pub fn is_closing(&self) -> bool {
        // ---
        self.closed.load(Ordering::Relaxed)
    }

    /// Sends `bytes` to the connected remote. Returns `false` (without
    /// retrying) if the sender is already closed or the send fails; the
    /// latter closes the sender for good.
    pub async fn send(&self, bytes: &[u8]) -> bool {
        // ---
        if self.is_closing() {
            return false;
        }

        match self.socket.send(bytes).await {
            Ok(_) => true,
            Err(e) => {
                error!("audio socket send error, closing: {e}");
                self.closed.store(true, Ordering::Relaxed);
                false
            }
        }
    }
}
