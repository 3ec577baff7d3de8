//! The RTSP signalling session, the MFiSAP/legacy-pairing handshakes, and
//! service discovery are external collaborators (out of scope for this
//! engine). This module only defines the seam: the trait the
//! orchestrator drives, and the Transport-header grammar it has to
//! parse out of the SETUP response.

use std::collections::HashMap;
use std::net::IpAddr;

use async_trait::async_trait;
use thiserror::Error;

use crate::metadata::AudioMetadata;

/// Failure surfaced by an RTSP round-trip.
#[derive(Debug, Error)]
pub enum RtspError {
    // ---
    #[error("RTSP protocol error: {0}")]
    Protocol(String),

    #[error("authentication failed: {0}")]
    Authentication(String),
}

/// `connection.local_ip` / `connection.remote_ip` from §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionInfo {
    // ---
    pub local_ip: IpAddr,
    pub remote_ip: IpAddr,
}

/// Result of a SETUP round-trip: the parsed Transport header plus the
/// RTSP session token to echo on subsequent requests.
#[derive(Debug, Clone)]
pub struct SetupResponse {
    // ---
    pub transport: TransportHeader,
    pub session: String,
}

/// Result of a FEEDBACK round-trip.
#[derive(Debug, Clone, Copy)]
pub struct FeedbackResponse {
    // ---
    pub code: u16,
}

impl FeedbackResponse {
    // ---
    pub const SUCCESS: u16 = 200;

    pub fn is_success(&self) -> bool {
        // ---
        self.code == Self::SUCCESS
    }
}

/// The RTSP signalling surface the orchestrator depends on. Consumed,
/// not implemented, by this engine — real implementations perform the
/// ANNOUNCE/SETUP/RECORD/SET_PARAMETER/FEEDBACK exchanges and any
/// MFiSAP/legacy-pairing cryptography.
#[async_trait]
pub trait RtspCollaborator: Send + Sync {
    // ---
    async fn auth_setup(&self) -> Result<(), RtspError>;

    /// Verifies the connection using legacy (non-MFiSAP) pairing
    /// credentials. Only called when the receiver does not advertise
    /// MFiSAP but the caller supplied credentials (§4.8). The actual
    /// pairing cryptography is an external collaborator's concern (§1);
    /// this is just the seam the orchestrator drives.
    async fn verify_legacy_pairing(&self, credentials: &str) -> Result<(), RtspError>;

    async fn announce(&self) -> Result<(), RtspError>;

    async fn setup(
        &self,
        local_control_port: u16,
        local_timing_port: u16,
    ) -> Result<SetupResponse, RtspError>;

    async fn record(&self, rtpseq: u16, rtptime: u32) -> Result<(), RtspError>;

    async fn set_parameter(&self, name: &str, value: &str) -> Result<(), RtspError>;

    async fn set_metadata(
        &self,
        rtpseq: u16,
        rtptime: u32,
        metadata: &AudioMetadata,
    ) -> Result<(), RtspError>;

    /// `allow_error` lets the caller tolerate a non-success response (used
    /// by the pre-flight keep-alive probe) instead of treating it as a
    /// hard failure.
    async fn feedback(&self, allow_error: bool) -> Result<FeedbackResponse, RtspError>;

    fn connection_info(&self) -> ConnectionInfo;
}

/// Parsed form of a SETUP response's `Transport` header:
/// `token (;token)*` where a token is either `key=value` (stored in
/// `options`, last write wins on duplicates) or a bare flag (collected
/// into `flags`).
#[derive(Debug, Clone, Default)]
pub struct TransportHeader {
    // ---
    pub options: HashMap<String, String>,
    pub flags: Vec<String>,
}

impl TransportHeader {
    // ---
    pub fn parse(raw: &str) -> Self {
        // ---
        let mut options = HashMap::new();
        let mut flags = Vec::new();

        for token in raw.split(';') {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            match token.split_once('=') {
                Some((key, value)) => {
                    options.insert(key.trim().to_string(), value.trim().to_string());
                }
                None => flags.push(token.to_string()),
            }
        }

        Self { options, flags }
    }

    /// `control_port` is mandatory in the SETUP response; a missing or
    /// unparseable value is a protocol error.
    pub fn control_port(&self) -> Result<u16, RtspError> {
        // ---
        self.required_port("control_port")
    }

    /// `server_port` is mandatory in the SETUP response.
    pub fn server_port(&self) -> Result<u16, RtspError> {
        // ---
        self.required_port("server_port")
    }

    /// `timing_port` is optional; a missing value defaults to `0` rather
    /// than failing the parse, matching the asymmetry in the reference
    /// implementation this protocol is drawn from.
    pub fn timing_port(&self) -> u16 {
        // ---
        self.options
            .get("timing_port")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    }

    fn required_port(&self, key: &str) -> Result<u16, RtspError> {
        // ---
        self.options
            .get(key)
            .ok_or_else(|| RtspError::Protocol(format!("Transport header missing {key}")))?
            .parse()
            .map_err(|_| RtspError::Protocol(format!("Transport header has invalid {key}")))
    }
}
