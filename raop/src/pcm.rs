//! The PCM source interface. Decoding an audio file into PCM is an
//! external collaborator's job; the engine only ever reads frames.

use async_trait::async_trait;

/// A source of interleaved PCM frames, `channels * bytes_per_channel`
/// bytes per frame.
#[async_trait]
pub trait PcmSource: Send {
    // ---
    /// Reads up to `n` frames, returning at most
    /// `n * channels * bytes_per_channel` bytes. A zero-length return
    /// means end of stream.
    async fn read_frames(&mut self, n: usize) -> std::io::Result<Vec<u8>>;

    /// Total duration in seconds, used for the `progress` SET_PARAMETER.
    /// May be zero if unknown.
    fn duration(&self) -> f64;
}
