//! Timing-request/response packet, used to let the receiver measure
//! round-trip latency against the sender's clock.

use crate::error::DecodeError;
use crate::timestamp::ntp_now;

/// Type byte set on a reflected timing response (`0x53 | 0x80`).
pub const TIMING_RESPONSE_TYPE: u8 = 0x53 | 0x80;

const TIMING_LENGTH: u16 = 0x0007;

/// 32-byte timing packet. The same layout is used for both the inbound
/// request and the reflected response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingPacket {
    // ---
    pub proto: u8,
    pub packet_type: u8,
    /// The requester's send timestamp on a request; echoed unmodified
    /// into the response's origin field.
    pub origin: u64,
    pub receive: u64,
    pub transmit: u64,
}

impl TimingPacket {
    // ---
    pub const SIZE: usize = 32;

    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        // ---
        if data.len() < Self::SIZE {
            return Err(DecodeError::TooShort {
                got: data.len(),
                need: Self::SIZE,
            });
        }
        Ok(Self {
            proto: data[0],
            packet_type: data[1],
            origin: u64::from_be_bytes([
                data[8], data[9], data[10], data[11], data[12], data[13], data[14], data[15],
            ]),
            receive: u64::from_be_bytes([
                data[16], data[17], data[18], data[19], data[20], data[21], data[22], data[23],
            ]),
            transmit: u64::from_be_bytes([
                data[24], data[25], data[26], data[27], data[28], data[29], data[30], data[31],
            ]),
        })
    }

    pub fn encode(&self) -> [u8; Self::SIZE] {
        // ---
        let mut buf = [0u8; Self::SIZE];
        buf[0] = self.proto;
        buf[1] = self.packet_type;
        buf[2..4].copy_from_slice(&TIMING_LENGTH.to_be_bytes());
        // bytes 4..8 are a zero-filled reserved field
        buf[8..16].copy_from_slice(&self.origin.to_be_bytes());
        buf[16..24].copy_from_slice(&self.receive.to_be_bytes());
        buf[24..32].copy_from_slice(&self.transmit.to_be_bytes());
        buf
    }

    /// Builds the reflected response for an inbound timing request.
    ///
    /// A single NTP sample is taken and reused for both the receive and
    /// transmit timestamps — local processing is well under a
    /// millisecond, far below the network transit time being measured.
    pub fn reflect(request: &TimingPacket) -> TimingPacket {
        // ---
        let now = ntp_now();
        TimingPacket {
            proto: request.proto,
            packet_type: TIMING_RESPONSE_TYPE,
            origin: request.origin,
            receive: now,
            transmit: now,
        }
    }
}
