//! Error taxonomy for the RAOP engine.
//!
//! Decode failures on inbound UDP packets are deliberately *not* part of
//! this enum — per the wire-protocol contract a malformed datagram is
//! dropped at the point of receipt and never surfaces to a caller.

use thiserror::Error;

use crate::rtsp::RtspError;

/// Errors that can propagate out of session setup or streaming.
#[derive(Debug, Error)]
pub enum RaopError {
    // ---
    /// The receiver's advertised encryption types don't intersect the set
    /// this engine supports (unencrypted, MFiSAP).
    #[error("no supported encryption mode advertised: {0}")]
    NotSupported(String),

    /// MFiSAP or legacy pairing verification failed.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// An RTSP round-trip failed, or an otherwise-unclassified error
    /// occurred during streaming and was wrapped here.
    #[error("protocol error: {0}")]
    Protocol(#[source] anyhow::Error),

    /// UDP transport failure. Non-fatal for control/timing; fatal for the
    /// audio socket, which simply closes and ends the streaming loop.
    #[error("transport error: {0}")]
    Transport(#[source] std::io::Error),
}

impl RaopError {
    // ---
    /// Wraps an arbitrary error as a protocol failure, the way the
    /// orchestrator wraps any non-protocol exception encountered mid-stream.
    pub fn protocol<E>(err: E) -> Self
    where
        E: Into<anyhow::Error>,
    {
        // ---
        RaopError::Protocol(err.into())
    }
}

/// RTSP round-trips surface only `Protocol`/`Authentication` failures
/// (§6); the orchestrator propagates them as-is rather than wrapping
/// them a second time (§7's "internal protocol/authentication errors
/// bubble with original stack").
impl From<RtspError> for RaopError {
    // ---
    fn from(err: RtspError) -> Self {
        // ---
        match err {
            RtspError::Protocol(msg) => RaopError::Protocol(anyhow::anyhow!(msg)),
            RtspError::Authentication(msg) => RaopError::Authentication(msg),
        }
    }
}

/// Decode failure for a fixed-layout wire packet. Never crosses the engine
/// boundary as a `RaopError` — callers that decode inbound datagrams treat
/// this as "drop silently, log at debug".
#[derive(Debug, Error)]
pub enum DecodeError {
    // ---
    #[error("packet too short: got {got} bytes, need at least {need}")]
    TooShort { got: usize, need: usize },

    #[error("unexpected packet type byte: {0:#04x}")]
    UnexpectedType(u8),
}
