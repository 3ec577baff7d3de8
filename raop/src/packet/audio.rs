//! RTP-style audio packet header and ALAC "fake frame" body.
//!
//! # Wire Format
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |    flags      |  payload type |        sequence number        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                           timestamp                           |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                          ssrc (session id)                    |
//! +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
//! |                       ALAC "fake frame" body                  |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! flags is always `0x80`; payload type is `0xE0` for the first packet of
//! a stream and `0x60` for every packet after.

use crate::error::DecodeError;

/// Flags byte carried by every audio packet.
pub const AUDIO_FLAGS: u8 = 0x80;

/// Payload-type byte for the first audio packet of a stream.
pub const AUDIO_PAYLOAD_TYPE_FIRST: u8 = 0xE0;

/// Payload-type byte for every audio packet after the first.
pub const AUDIO_PAYLOAD_TYPE_REST: u8 = 0x60;

/// The 12-byte fixed header in front of every audio packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioPacketHeader {
    // ---
    pub flags: u8,
    pub payload_type: u8,
    pub sequence: u16,
    pub timestamp: u32,
    pub ssrc: u32,
}

impl AudioPacketHeader {
    // ---
    pub const SIZE: usize = 12;

    pub fn first(sequence: u16, timestamp: u32, ssrc: u32) -> Self {
        // ---
        Self {
            flags: AUDIO_FLAGS,
            payload_type: AUDIO_PAYLOAD_TYPE_FIRST,
            sequence,
            timestamp,
            ssrc,
        }
    }

    pub fn subsequent(sequence: u16, timestamp: u32, ssrc: u32) -> Self {
        // ---
        Self {
            flags: AUDIO_FLAGS,
            payload_type: AUDIO_PAYLOAD_TYPE_REST,
            sequence,
            timestamp,
            ssrc,
        }
    }

    /// Encodes the 12-byte header.
    pub fn encode(&self) -> [u8; Self::SIZE] {
        // ---
        let mut buf = [0u8; Self::SIZE];
        buf[0] = self.flags;
        buf[1] = self.payload_type;
        buf[2..4].copy_from_slice(&self.sequence.to_be_bytes());
        buf[4..8].copy_from_slice(&self.timestamp.to_be_bytes());
        buf[8..12].copy_from_slice(&self.ssrc.to_be_bytes());
        buf
    }

    /// Decodes the 12-byte header from the front of `data`.
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
            payload_type: data[1],
            sequence: u16::from_be_bytes([data[2], data[3]]),
            timestamp: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
            ssrc: u32::from_be_bytes([data[8], data[9], data[10], data[11]]),
        })
    }
}

/// Builds the ALAC "fake frame" body: a 3-byte bit-prefix marking the
/// frame uncompressed, followed by the PCM samples with each 16-bit
/// sample's bytes swapped.
///
/// This is not a real ALAC encoding — it is the bit pattern RAOP
/// receivers expect in place of one, preserved exactly as the wire
/// protocol requires.
pub fn build_alac_body(channels: u8, pcm: &[u8]) -> Vec<u8> {
    // ---
    let channel_bits = ((channels.saturating_sub(1)) & 0x3) as u32;
    let prefix_value: u32 = (channel_bits << 20) | 1;
    let mut body = Vec::with_capacity(3 + pcm.len());
    body.push(((prefix_value >> 16) & 0xFF) as u8);
    body.push(((prefix_value >> 8) & 0xFF) as u8);
    body.push((prefix_value & 0xFF) as u8);

    let mut pairs = pcm.chunks_exact(2);
    for pair in &mut pairs {
        body.push(pair[1]);
        body.push(pair[0]);
    }
    // An odd trailing byte (shouldn't occur for 16-bit PCM) is passed
    // through unswapped rather than dropped.
    body.extend_from_slice(pairs.remainder());

    body
}
