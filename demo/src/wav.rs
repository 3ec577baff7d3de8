//! WAV-backed PCM source (grounded on the teacher's `sender::audio::read_wav`).
//!
//! Unlike the teacher's Opus pipeline, RAOP streams raw PCM at whatever
//! rate/channel count the receiver negotiated (spec.md Non-goal: no
//! resampling) — this reader keeps the file's native sample rate and
//! channel count rather than forcing 16kHz mono.

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use raop::pcm::PcmSource;
use tracing::info;

/// PCM frames read from a 16-bit WAV file, read eagerly into memory.
pub struct WavSource {
    bytes: Vec<u8>,
    cursor: usize,
    frame_size: usize,
    duration: f64,
    sample_rate: u32,
    channels: u16,
}

impl WavSource {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("reading WAV file: {}", path.display());

        let mut reader = hound::WavReader::open(path)
            .with_context(|| format!("failed to open WAV file: {}", path.display()))?;
        let spec = reader.spec();
        info!(
            "WAV format: {}Hz, {} channels, {} bits",
            spec.sample_rate, spec.channels, spec.bits_per_sample
        );

        let samples: Vec<i16> = match (spec.sample_format, spec.bits_per_sample) {
            (hound::SampleFormat::Int, 16) => reader
                .samples::<i16>()
                .collect::<std::result::Result<Vec<_>, _>>()
                .context("failed to read 16-bit PCM WAV samples")?,
            (hound::SampleFormat::Float, 32) => reader
                .samples::<f32>()
                .collect::<std::result::Result<Vec<_>, _>>()
                .context("failed to read 32-bit float WAV samples")?
                .into_iter()
                .map(|s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                .collect(),
            (fmt, bits) => {
                anyhow::bail!("unsupported WAV format: {fmt:?}/{bits}-bit (only 16-bit PCM or 32-bit float are supported)");
            }
        };

        let frame_size = spec.channels as usize * 2;
        let frame_count = samples.len() / spec.channels as usize;
        let duration = frame_count as f64 / spec.sample_rate as f64;

        let mut bytes = Vec::with_capacity(samples.len() * 2);
        for sample in &samples {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }

        info!(
            "loaded {:.2}s of audio ({} frames)",
            duration, frame_count
        );

        Ok(Self {
            bytes,
            cursor: 0,
            frame_size,
            duration,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }
}

#[async_trait]
impl PcmSource for WavSource {
    async fn read_frames(&mut self, n: usize) -> std::io::Result<Vec<u8>> {
        let want = n * self.frame_size;
        let remaining = self.bytes.len().saturating_sub(self.cursor);
        let take = want.min(remaining);
        let chunk = self.bytes[self.cursor..self.cursor + take].to_vec();
        self.cursor += take;
        Ok(chunk)
    }

    fn duration(&self) -> f64 {
        self.duration
    }
}
