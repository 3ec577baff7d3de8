//! Session Orchestrator (§4.8): wires the endpoints and streaming loop
//! together, drives setup via the RTSP collaborator, manages keep-alive,
//! and fires listener events.
//!
//! Lifecycle: `Created -> Initialized -> Setup -> Streaming -> Stopped`.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

use crate::backlog::{PacketBacklog, SharedBacklog};
use crate::context::SharedContext;
use crate::error::RaopError;
use crate::metadata::{AudioMetadata, PlaybackInfo};
use crate::pcm::PcmSource;
use crate::properties::{
    parse_audio_properties, parse_encryption_types, parse_metadata_types, EncryptionTypes,
    MetadataTypes, SUPPORTED_ENCRYPTIONS,
};
use crate::rtsp::RtspCollaborator;
use crate::udp::{AudioSender, ControlEndpoint, TimingEndpoint};
use crate::{context::SessionContext, streaming};

/// Interval between keep-alive FEEDBACK round-trips (§6).
pub const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(25);

/// Lifecycle state of a [`RaopSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    // ---
    Created,
    Initialized,
    Setup,
    Streaming,
    Stopped,
}

/// Listener contract (§6): `playing` fires exactly once before the first
/// audio packet could be observed by the receiver as playing; `stopped`
/// fires exactly once at teardown, success or failure. Held weakly by
/// the session — the engine must not extend its lifetime.
pub trait RaopListener: Send + Sync {
    // ---
    fn playing(&self, playback_info: PlaybackInfo);
    fn stopped(&self);
}

/// Orchestrates one RAOP stream end to end.
pub struct RaopSession {
    // ---
    rtsp: Arc<dyn RtspCollaborator>,
    credentials: Option<String>,
    metrics: Option<raop_common::MetricsContext>,

    context: SharedContext,
    backlog: SharedBacklog,

    encryption_types: EncryptionTypes,
    metadata_types: MetadataTypes,
    metadata: AudioMetadata,

    control: Option<ControlEndpoint>,
    timing_port: Option<u16>,
    timing_task: Option<JoinHandle<()>>,
    keep_alive_task: Option<JoinHandle<()>>,

    listener: Option<Weak<dyn RaopListener>>,
    state: State,
}

impl RaopSession {
    // ---
    pub fn new(rtsp: Arc<dyn RtspCollaborator>, credentials: Option<String>) -> Self {
        // ---
        Self::with_metrics(rtsp, credentials, None)
    }

    pub fn with_metrics(
        rtsp: Arc<dyn RtspCollaborator>,
        credentials: Option<String>,
        metrics: Option<raop_common::MetricsContext>,
    ) -> Self {
        // ---
        Self {
            rtsp,
            credentials,
            metrics,
            context: Arc::new(Mutex::new(SessionContext::new())),
            backlog: Arc::new(Mutex::new(PacketBacklog::default())),
            encryption_types: EncryptionTypes::NONE,
            metadata_types: MetadataTypes::NONE,
            metadata: AudioMetadata::default(),
            control: None,
            timing_port: None,
            timing_task: None,
            keep_alive_task: None,
            listener: None,
            state: State::Created,
        }
    }

    pub fn state(&self) -> State {
        // ---
        self.state
    }

    /// Installs a weak back-reference to a listener. The engine never
    /// upgrades this into an owning reference except momentarily, to
    /// deliver a single callback.
    pub fn set_listener(&mut self, listener: &Arc<dyn RaopListener>) {
        // ---
        self.listener = Some(Arc::downgrade(listener));
    }

    async fn playback_info(&self) -> PlaybackInfo {
        // ---
        let position = self.context.lock().expect("context mutex poisoned").position();
        let metadata = if self.metadata.is_empty() {
            AudioMetadata::placeholder()
        } else {
            self.metadata.clone()
        };
        PlaybackInfo { metadata, position }
    }

    fn notify_playing(&self, info: PlaybackInfo) {
        // ---
        if let Some(listener) = self.listener.as_ref().and_then(Weak::upgrade) {
            listener.playing(info);
        }
    }

    fn notify_stopped(&self) {
        // ---
        if let Some(listener) = self.listener.as_ref().and_then(Weak::upgrade) {
            listener.stopped();
        }
    }

    /// `Created -> Initialized` (§4.8). Parses the receiver's advertised
    /// properties, derives the audio format, and binds the local Control
    /// and Timing UDP sockets.
    pub async fn initialize(
        &mut self,
        properties: &HashMap<String, String>,
    ) -> Result<(), RaopError> {
        // ---
        let encryption_types = parse_encryption_types(properties);
        let metadata_types = parse_metadata_types(properties);

        debug!("initializing with encryption={encryption_types:?}, metadata={metadata_types:?}");

        if !encryption_types.intersects(SUPPORTED_ENCRYPTIONS) {
            return Err(RaopError::NotSupported(format!(
                "no supported encryption types in {encryption_types:?}"
            )));
        }

        self.encryption_types = encryption_types;
        self.metadata_types = metadata_types;

        let audio_props = parse_audio_properties(properties);
        {
            let mut ctx = self.context.lock().expect("context mutex poisoned");
            ctx.apply_audio_properties(audio_props);
        }

        let local_ip = self.rtsp.connection_info().local_ip;

        let control = ControlEndpoint::bind(
            local_ip,
            Arc::clone(&self.context),
            Arc::clone(&self.backlog),
            self.metrics.clone(),
        )
        .await
        .map_err(RaopError::Transport)?;

        let timing = TimingEndpoint::bind(local_ip)
            .await
            .map_err(RaopError::Transport)?;
        let timing_port = timing.local_port().map_err(RaopError::Transport)?;

        debug!(
            "local ports: control={}, timing={}",
            control.local_port().map_err(RaopError::Transport)?,
            timing_port
        );

        self.control = Some(control);
        self.timing_port = Some(timing_port);
        self.timing_task = Some(tokio::spawn(timing.run()));
        self.state = State::Initialized;

        Ok(())
    }

    /// `Initialized -> Setup -> Streaming -> Stopped`: performs the RTSP
    /// setup round-trips, streams `source` to completion (or until the
    /// socket closes), and always runs teardown on the way out.
    pub async fn send_audio(
        &mut self,
        source: Box<dyn PcmSource>,
        metadata: AudioMetadata,
    ) -> Result<(), RaopError> {
        // ---
        if self.control.is_none() || self.timing_port.is_none() {
            return Err(RaopError::protocol(anyhow::anyhow!(
                "session not initialized"
            )));
        }

        let result = self.run_send_audio(source, metadata).await;
        self.teardown();
        result
    }

    async fn run_send_audio(
        &mut self,
        mut source: Box<dyn PcmSource>,
        metadata: AudioMetadata,
    ) -> Result<(), RaopError> {
        // ---
        self.setup_session().await?;

        let remote_ip = self.rtsp.connection_info().remote_ip;
        let (control_port, server_port) = {
            let ctx = self.context.lock().expect("context mutex poisoned");
            (ctx.control_port, ctx.server_port)
        };

        let audio = AudioSender::connect(SocketAddr::new(remote_ip, server_port))
            .await
            .map_err(RaopError::Transport)?;

        self.control
            .as_mut()
            .expect("control endpoint bound during initialize")
            .start(SocketAddr::new(remote_ip, control_port));

        self.state = State::Streaming;

        if self.metadata_types.contains(MetadataTypes::PROGRESS) {
            let duration = source.duration();
            let (start, now, end) = {
                let ctx = self.context.lock().expect("context mutex poisoned");
                let end = ctx
                    .start_ts
                    .wrapping_add((duration * ctx.sample_rate as f64) as u32);
                (ctx.start_ts, ctx.rtptime(), end)
            };
            self.rtsp
                .set_parameter("progress", &format!("{start}/{now}/{end}"))
                .await?;
        }

        self.metadata = metadata;
        if self.metadata_types.contains(MetadataTypes::TEXT) {
            let (rtpseq, rtptime) = {
                let ctx = self.context.lock().expect("context mutex poisoned");
                (ctx.rtpseq, ctx.rtptime())
            };
            let info = self.playback_info().await;
            debug!("playing with metadata: {:?}", info.metadata);
            self.rtsp
                .set_metadata(rtpseq, rtptime, &info.metadata)
                .await?;
        }

        // Range is [-30, 0]; -144 means muted (§6).
        self.rtsp.set_parameter("volume", "-20").await?;

        let feedback = self.rtsp.feedback(true).await?;
        if feedback.is_success() {
            self.spawn_keep_alive();
        } else {
            debug!("keep-alive not supported, not starting task");
        }

        let info = self.playback_info().await;
        self.notify_playing(info);

        let (rtpseq, rtptime) = {
            let ctx = self.context.lock().expect("context mutex poisoned");
            (ctx.rtpseq, ctx.rtptime())
        };
        self.rtsp.record(rtpseq, rtptime).await?;

        streaming::run(
            Arc::clone(&self.context),
            Arc::clone(&self.backlog),
            &audio,
            source,
            self.metrics.clone(),
        )
        .await
        .map_err(RaopError::Transport)?;

        Ok(())
    }

    async fn setup_session(&mut self) -> Result<(), RaopError> {
        // ---
        if self.encryption_types.contains(EncryptionTypes::MFISAP) {
            self.rtsp.auth_setup().await?;
        } else if let Some(credentials) = self.credentials.clone() {
            self.rtsp.verify_legacy_pairing(&credentials).await?;
        }

        self.rtsp.announce().await?;

        let control_port = self
            .control
            .as_ref()
            .expect("control endpoint bound during initialize")
            .local_port()
            .map_err(RaopError::Transport)?;
        let timing_port = self
            .timing_port
            .expect("timing endpoint bound during initialize");

        let response = self.rtsp.setup(control_port, timing_port).await?;

        {
            let mut ctx = self.context.lock().expect("context mutex poisoned");
            ctx.control_port = response.transport.control_port()?;
            ctx.timing_port = response.transport.timing_port();
            ctx.server_port = response.transport.server_port()?;
            ctx.rtsp_session = response.session;
        }

        self.state = State::Setup;
        Ok(())
    }

    fn spawn_keep_alive(&mut self) {
        // ---
        let rtsp = Arc::clone(&self.rtsp);
        let metrics = self.metrics.clone();
        self.keep_alive_task = Some(tokio::spawn(async move {
            loop {
                tokio::time::sleep(KEEP_ALIVE_INTERVAL).await;
                debug!("sending keep-alive feedback");
                match rtsp.feedback(false).await {
                    Ok(_) => {
                        if let Some(m) = &metrics {
                            m.keep_alive_success_total.inc();
                        }
                    }
                    Err(e) => {
                        tracing::warn!("keep-alive feedback failed: {e}");
                        if let Some(m) = &metrics {
                            m.keep_alive_failure_total.inc();
                        }
                    }
                }
            }
        }));
    }

    /// Synchronous, idempotent resource release: aborts the timing
    /// listener task, stops the control endpoint's periodic task, and
    /// cancels keep-alive. Safe to call even if `initialize` was never
    /// called. Distinct from the full teardown run at the end of
    /// `send_audio`, which additionally clears the backlog and notifies
    /// the listener.
    pub fn close(&mut self) {
        // ---
        if let Some(handle) = self.timing_task.take() {
            handle.abort();
        }
        if let Some(control) = self.control.as_mut() {
            control.stop();
        }
        if let Some(handle) = self.keep_alive_task.take() {
            handle.abort();
        }
    }

    fn teardown(&mut self) {
        // ---
        self.close();
        self.backlog.lock().expect("backlog mutex poisoned").clear();
        self.state = State::Stopped;
        self.notify_stopped();
    }
}
