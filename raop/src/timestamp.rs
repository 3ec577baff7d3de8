//! Conversions between monotonic nanoseconds, RTP frame counts, and the
//! NTP 64-bit fixed-point timestamp format used on the wire.

use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds between the NTP epoch (1900-01-01) and the Unix epoch
/// (1970-01-01).
const NTP_UNIX_EPOCH_DELTA: u64 = 2_208_988_800;

/// Current wall clock as a 64-bit NTP timestamp: upper 32 bits are whole
/// seconds since the NTP epoch, lower 32 bits are the binary fraction of
/// the current second.
pub fn ntp_now() -> u64 {
    // ---
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let secs = now.as_secs() + NTP_UNIX_EPOCH_DELTA;
    let frac = ((now.subsec_nanos() as u64) << 32) / 1_000_000_000;
    (secs << 32) | frac
}

/// Splits a 64-bit NTP timestamp into its integer-seconds and
/// binary-fraction halves.
pub fn ntp2parts(ts: u64) -> (u32, u32) {
    // ---
    ((ts >> 32) as u32, (ts & 0xFFFF_FFFF) as u32)
}

/// Joins an (seconds, fraction) pair back into a 64-bit NTP timestamp.
pub fn parts2ntp(seconds: u32, frac: u32) -> u64 {
    // ---
    ((seconds as u64) << 32) | (frac as u64)
}

/// Converts an RTP frame count, at `sample_rate` frames/second, into an
/// NTP timestamp relative to the NTP epoch. Frames are treated as elapsed
/// time at `sample_rate` Hz, not wall-clock time.
pub fn ts2ntp(frames: u64, sample_rate: u32) -> u64 {
    // ---
    let sample_rate = sample_rate as u64;
    let seconds = frames / sample_rate;
    let remainder = frames % sample_rate;
    let frac = (remainder << 32) / sample_rate;
    parts2ntp(seconds as u32, frac as u32)
}

/// Process monotonic clock, in nanoseconds, suitable for measuring elapsed
/// intervals (not wall-clock time).
pub fn monotonic_ns() -> u64 {
    // ---
    use std::sync::OnceLock;
    use std::time::Instant;

    static EPOCH: OnceLock<Instant> = OnceLock::new();
    let epoch = EPOCH.get_or_init(Instant::now);
    epoch.elapsed().as_nanos() as u64
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn ntp_now_is_after_epoch_delta() {
        // ---
        let (secs, _) = ntp2parts(ntp_now());
        assert!(secs > NTP_UNIX_EPOCH_DELTA as u32);
    }

    #[test]
    fn ts2ntp_whole_seconds() {
        // ---
        let ts = ts2ntp(88200, 44100);
        let (secs, frac) = ntp2parts(ts);
        assert_eq!(secs, 2);
        assert_eq!(frac, 0);
    }

    #[test]
    fn ts2ntp_fractional_seconds_roundtrip_within_one_ulp() {
        // ---
        let frames = 70400u64;
        let sample_rate = 44100u32;
        let ts = ts2ntp(frames, sample_rate);
        let (secs, frac) = ntp2parts(ts);

        assert_eq!(secs as u64, frames / sample_rate as u64);

        let remainder = frames % sample_rate as u64;
        let expected_frac = (remainder << 32) / sample_rate as u64;
        assert!((frac as i64 - expected_frac as i64).unsigned_abs() <= 1);
    }

    #[test]
    fn monotonic_ns_is_nondecreasing() {
        // ---
        let a = monotonic_ns();
        let b = monotonic_ns();
        assert!(b >= a);
    }
}
