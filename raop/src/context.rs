//! Session Context (§3): mutable state shared across every component —
//! set up once at construction, mutated during setup, read (and, for
//! `rtpseq`/`head_ts`, mutated) during streaming, torn down at close.
//!
//! Shared between the orchestrator and the control endpoint. The
//! concurrency model is cooperative single-thread in principle (§5), but
//! this engine runs on a multi-threaded tokio runtime, so the context is
//! wrapped in a plain [`std::sync::Mutex`] rather than pretending
//! single-thread access — critical sections here are a handful of field
//! reads/writes, never held across an `.await`.

use std::sync::{Arc, Mutex};

use crate::properties::AudioProperties;

/// Frames per RAOP audio packet (§6).
pub const FRAMES_PER_PACKET: u32 = 352;

/// Default round-trip latency: 2s at 44.1kHz.
pub const DEFAULT_LATENCY: u32 = 88_200;

pub type SharedContext = Arc<Mutex<SessionContext>>;

/// Per-stream mutable state (§3).
#[derive(Debug, Clone)]
pub struct SessionContext {
    // ---
    pub sample_rate: u32,
    pub channels: u16,
    pub bytes_per_channel: u8,

    /// 16-bit wrapping RTP sequence counter, incremented once per audio
    /// packet sent.
    pub rtpseq: u16,

    /// 32-bit wrapping frame counter ("rtptime" / "head_ts"), advanced by
    /// `frames_per_packet` per packet actually sent.
    pub head_ts: u32,

    /// `head_ts` at the first packet of the stream.
    pub start_ts: u32,

    /// RTP SSRC, chosen once at construction and carried in every audio
    /// packet.
    pub session_id: u32,

    /// Round-trip latency in frames.
    pub latency: u32,

    pub control_port: u16,
    pub timing_port: u16,
    pub server_port: u16,

    /// RTSP session token echoed on subsequent requests.
    pub rtsp_session: String,
}

impl SessionContext {
    // ---
    pub fn new() -> Self {
        // ---
        let defaults = AudioProperties::default();
        let mut ctx = Self {
            sample_rate: defaults.sample_rate,
            channels: defaults.channels,
            bytes_per_channel: defaults.bytes_per_channel,
            rtpseq: 0,
            head_ts: 0,
            start_ts: 0,
            session_id: rand::random(),
            latency: DEFAULT_LATENCY,
            control_port: 0,
            timing_port: 0,
            server_port: 0,
            rtsp_session: String::new(),
        };
        ctx.reset();
        ctx
    }

    /// Applies a newly-negotiated audio format and resets the sequencing
    /// state that depends on it. Lets a single session be (re)initialized
    /// for more than one track without carrying over stale sequence state
    /// (SPEC_FULL C.2).
    pub fn apply_audio_properties(&mut self, props: AudioProperties) {
        // ---
        self.sample_rate = props.sample_rate;
        self.channels = props.channels;
        self.bytes_per_channel = props.bytes_per_channel;
        self.reset();
    }

    /// Re-randomizes `rtpseq`/`start_ts`/`head_ts` (RFC 3550 recommends a
    /// random initial sequence number and timestamp to avoid collisions
    /// across sessions sharing an SSRC-less stream start).
    pub fn reset(&mut self) {
        // ---
        self.rtpseq = rand::random();
        self.start_ts = rand::random();
        self.head_ts = self.start_ts;
    }

    /// Advances `rtpseq` (mod 2^16) and `head_ts` by `frames`, as done
    /// once per audio packet actually sent.
    pub fn advance(&mut self, frames: u32) {
        // ---
        self.rtpseq = self.rtpseq.wrapping_add(1);
        self.head_ts = self.head_ts.wrapping_add(frames);
    }

    /// Elapsed seconds since playback start, derived from `head_ts`.
    pub fn position(&self) -> f64 {
        // ---
        let elapsed_frames = self.head_ts.wrapping_sub(self.start_ts);
        elapsed_frames as f64 / self.sample_rate as f64
    }

    /// Frame-count alias for `head_ts`, named the way the wire protocol
    /// and spec.md §3 refer to it.
    pub fn rtptime(&self) -> u32 {
        // ---
        self.head_ts
    }
}

impl Default for SessionContext {
    // ---
    fn default() -> Self {
        // ---
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn advance_wraps_rtpseq_past_0xffff() {
        // ---
        let mut ctx = SessionContext::new();
        ctx.rtpseq = 0xFFFF;
        ctx.advance(FRAMES_PER_PACKET);
        assert_eq!(ctx.rtpseq, 0x0000);
    }

    #[test]
    fn advance_adds_exactly_frames_per_packet() {
        // ---
        let mut ctx = SessionContext::new();
        let before = ctx.head_ts;
        ctx.advance(FRAMES_PER_PACKET);
        assert_eq!(ctx.head_ts, before.wrapping_add(FRAMES_PER_PACKET));
    }

    #[test]
    fn position_is_zero_at_start() {
        // ---
        let ctx = SessionContext::new();
        assert_eq!(ctx.position(), 0.0);
    }

    #[test]
    fn apply_audio_properties_resets_sequence_state() {
        // ---
        let mut ctx = SessionContext::new();
        ctx.advance(FRAMES_PER_PACKET);
        let seq_before = ctx.rtpseq;
        ctx.apply_audio_properties(AudioProperties {
            sample_rate: 48_000,
            channels: 2,
            bytes_per_channel: 2,
        });
        assert_eq!(ctx.sample_rate, 48_000);
        assert_eq!(ctx.head_ts, ctx.start_ts);
        // Reset re-randomizes, so it need not differ from seq_before, but
        // the invariant under test is that head_ts/start_ts realign.
        let _ = seq_before;
    }
}
