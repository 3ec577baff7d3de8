//! A minimal `RtspCollaborator` (spec.md §6 / SPEC_FULL.md §C.7): logs each
//! signalling round-trip instead of performing it, and answers SETUP with
//! the receiver ports the operator supplied on the command line.
//!
//! The real ANNOUNCE/SETUP/RECORD/SET_PARAMETER/FEEDBACK exchange, and any
//! MFiSAP/legacy-pairing cryptography, are out of scope for this engine
//! (spec.md §1) — this stands in for a real RTSP session so the engine can
//! be exercised end to end against a receiver whose ports are already
//! known.

use std::net::IpAddr;

use async_trait::async_trait;
use raop::metadata::AudioMetadata;
use raop::rtsp::{ConnectionInfo, FeedbackResponse, RtspCollaborator, RtspError, SetupResponse, TransportHeader};
use tracing::info;

pub struct MockRtspCollaborator {
    local_ip: IpAddr,
    remote_ip: IpAddr,
    remote_server_port: u16,
    remote_control_port: u16,
    remote_timing_port: u16,
}

impl MockRtspCollaborator {
    pub fn new(
        local_ip: IpAddr,
        remote_ip: IpAddr,
        remote_server_port: u16,
        remote_control_port: u16,
        remote_timing_port: u16,
    ) -> Self {
        Self {
            local_ip,
            remote_ip,
            remote_server_port,
            remote_control_port,
            remote_timing_port,
        }
    }
}

#[async_trait]
impl RtspCollaborator for MockRtspCollaborator {
    async fn auth_setup(&self) -> Result<(), RtspError> {
        info!("(mock) auth_setup");
        Ok(())
    }

    async fn verify_legacy_pairing(&self, _credentials: &str) -> Result<(), RtspError> {
        info!("(mock) verify_legacy_pairing");
        Ok(())
    }

    async fn announce(&self) -> Result<(), RtspError> {
        info!("(mock) ANNOUNCE");
        Ok(())
    }

    async fn setup(
        &self,
        local_control_port: u16,
        local_timing_port: u16,
    ) -> Result<SetupResponse, RtspError> {
        info!(
            "(mock) SETUP: local control={local_control_port}, timing={local_timing_port}"
        );
        let transport = TransportHeader::parse(&format!(
            "RTP/AVP/UDP;unicast;mode=record;control_port={};timing_port={};server_port={}",
            self.remote_control_port, self.remote_timing_port, self.remote_server_port
        ));
        Ok(SetupResponse {
            transport,
            session: "raop-demo-session".to_string(),
        })
    }

    async fn record(&self, rtpseq: u16, rtptime: u32) -> Result<(), RtspError> {
        info!("(mock) RECORD: rtpseq={rtpseq}, rtptime={rtptime}");
        Ok(())
    }

    async fn set_parameter(&self, name: &str, value: &str) -> Result<(), RtspError> {
        info!("(mock) SET_PARAMETER {name}={value}");
        Ok(())
    }

    async fn set_metadata(
        &self,
        rtpseq: u16,
        rtptime: u32,
        metadata: &AudioMetadata,
    ) -> Result<(), RtspError> {
        info!("(mock) SET_METADATA at ({rtpseq}, {rtptime}): {metadata:?}");
        Ok(())
    }

    async fn feedback(&self, allow_error: bool) -> Result<FeedbackResponse, RtspError> {
        info!("(mock) FEEDBACK (allow_error={allow_error})");
        Ok(FeedbackResponse {
            code: FeedbackResponse::SUCCESS,
        })
    }

    fn connection_info(&self) -> ConnectionInfo {
        ConnectionInfo {
            local_ip: self.local_ip,
            remote_ip: self.remote_ip,
        }
    }
}
