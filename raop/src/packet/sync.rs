//! The periodic sync packet that anchors the receiver's render clock to
//! the sender's frame clock.

use crate::error::DecodeError;

/// Flags byte on the first sync packet of a session.
pub const SYNC_FLAGS_FIRST: u8 = 0x90;

/// Flags byte on every sync packet after the first.
pub const SYNC_FLAGS_SUBSEQUENT: u8 = 0x80;

const SYNC_TYPE: u8 = 0xD4;
const SYNC_LENGTH: u16 = 0x0007;

/// 20-byte sync packet, emitted once per second on the control channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncPacket {
    // ---
    pub flags: u8,
    /// `rtptime - latency` at the moment of emission.
    pub rtp_timestamp_minus_latency: u32,
    /// Stream-relative NTP timestamp, i.e. `ts2ntp(head_ts, sample_rate)`.
    pub current_time: u64,
    /// Current `rtptime`.
    pub rtp_timestamp: u32,
}

impl SyncPacket {
    // ---
    pub const SIZE: usize = 20;

    pub fn encode(&self) -> [u8; Self::SIZE] {
        // ---
        let mut buf = [0u8; Self::SIZE];
        buf[0] = self.flags;
        buf[1] = SYNC_TYPE;
        buf[2..4].copy_from_slice(&SYNC_LENGTH.to_be_bytes());
        buf[4..8].copy_from_slice(&self.rtp_timestamp_minus_latency.to_be_bytes());
        buf[8..16].copy_from_slice(&self.current_time.to_be_bytes());
        buf[16..20].copy_from_slice(&self.rtp_timestamp.to_be_bytes());
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        // ---
        if data.len() < Self::SIZE {
            return Err(DecodeError::TooShort {
                got: data.len(),
                need: Self::SIZE,
            });
        }
        Ok(Self {
            flags: data[0],
            rtp_timestamp_minus_latency: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
            current_time: u64::from_be_bytes([
                data[8], data[9], data[10], data[11], data[12], data[13], data[14], data[15],
            ]),
            rtp_timestamp: u32::from_be_bytes([data[16], data[17], data[18], data[19]]),
        })
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn sync_packet_roundtrip() {
        // ---
        let packet = SyncPacket {
            flags: SYNC_FLAGS_FIRST,
            rtp_timestamp_minus_latency: 100,
            current_time: 0x1122_3344_5566_7788,
            rtp_timestamp: 88300,
        };
        let encoded = packet.encode();
        assert_eq!(encoded[1], SYNC_TYPE);
        assert_eq!(u16::from_be_bytes([encoded[2], encoded[3]]), SYNC_LENGTH);

        let decoded = SyncPacket::decode(&encoded).expect("decode should succeed");
        assert_eq!(packet, decoded);
    }

    #[test]
    fn too_short_is_decode_error() {
        // ---
        assert!(SyncPacket::decode(&[0u8; 10]).is_err());
    }
}
