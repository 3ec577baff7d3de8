//! Parsing of the receiver's advertised properties (§6 Properties Map):
//! encryption types, metadata types, and the audio format triple.
//!
//! The properties map is an opaque string→string mapping handed to
//! [`crate::session::RaopSession::initialize`] by the service-discovery
//! collaborator (out of scope here). Recognized keys follow AirPlay v1's
//! `txt` record conventions: `et` (encryption types), `md` (metadata
//! types), `sr`/`ch`/`ss` (sample rate, channels, sample size in bits).

use std::collections::HashMap;
use std::ops::BitOr;

/// Bitset of encryption modes a receiver advertises via `et`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EncryptionTypes(u8);

impl EncryptionTypes {
    // ---
    pub const NONE: Self = Self(0);
    pub const UNENCRYPTED: Self = Self(0b001);
    pub const MFISAP: Self = Self(0b010);
    /// Set when an advertised code isn't one this engine recognizes at
    /// all (e.g. RSA, FairPlay) — never itself satisfies "supported".
    pub const UNKNOWN: Self = Self(0b100);

    pub fn contains(self, other: Self) -> bool {
        // ---
        self.0 & other.0 == other.0
    }

    pub fn intersects(self, other: Self) -> bool {
        // ---
        self.0 & other.0 != 0
    }

    pub fn is_empty(self) -> bool {
        // ---
        self.0 == 0
    }
}

impl BitOr for EncryptionTypes {
    // ---
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        // ---
        Self(self.0 | rhs.0)
    }
}

/// The set of encryption modes this engine can stream under (§1: "no
/// encryption of audio payload beyond the MFiSAP-negotiated shared
/// secret; unencrypted and MFiSAP-negotiated are the only accepted
/// modes").
pub const SUPPORTED_ENCRYPTIONS: EncryptionTypes =
    EncryptionTypes(EncryptionTypes::UNENCRYPTED.0 | EncryptionTypes::MFISAP.0);

/// Bitset of metadata features a receiver advertises via `md`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetadataTypes(u8);

impl MetadataTypes {
    // ---
    pub const NONE: Self = Self(0);
    pub const TEXT: Self = Self(0b001);
    pub const ARTWORK: Self = Self(0b010);
    pub const PROGRESS: Self = Self(0b100);

    pub fn contains(self, other: Self) -> bool {
        // ---
        self.0 & other.0 == other.0
    }
}

impl BitOr for MetadataTypes {
    // ---
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        // ---
        Self(self.0 | rhs.0)
    }
}

/// `sample_rate` / `channels` / `bytes_per_channel` as advertised by the
/// receiver, applied to the Session Context at `initialize()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioProperties {
    // ---
    pub sample_rate: u32,
    pub channels: u16,
    pub bytes_per_channel: u8,
}

impl Default for AudioProperties {
    // ---
    fn default() -> Self {
        // ---
        Self {
            sample_rate: 44_100,
            channels: 2,
            bytes_per_channel: 2,
        }
    }
}

fn parse_code_list(raw: &str) -> Vec<u32> {
    // ---
    raw.split(',')
        .filter_map(|tok| tok.trim().parse::<u32>().ok())
        .collect()
}

/// Parses the `et` property into an [`EncryptionTypes`] bitset. `0` means
/// unencrypted, `4` means MFiSAP; anything else sets the `UNKNOWN` bit.
/// A missing `et` key is treated as advertising nothing.
pub fn parse_encryption_types(properties: &HashMap<String, String>) -> EncryptionTypes {
    // ---
    let Some(raw) = properties.get("et") else {
        return EncryptionTypes::NONE;
    };

    parse_code_list(raw)
        .into_iter()
        .map(|code| match code {
            0 => EncryptionTypes::UNENCRYPTED,
            4 => EncryptionTypes::MFISAP,
            _ => EncryptionTypes::UNKNOWN,
        })
        .fold(EncryptionTypes::NONE, BitOr::bitor)
}

/// Parses the `md` property into a [`MetadataTypes`] bitset: `0` = Text,
/// `1` = Artwork, `2` = Progress. Unrecognized codes are ignored.
pub fn parse_metadata_types(properties: &HashMap<String, String>) -> MetadataTypes {
    // ---
    let Some(raw) = properties.get("md") else {
        return MetadataTypes::NONE;
    };

    parse_code_list(raw)
        .into_iter()
        .filter_map(|code| match code {
            0 => Some(MetadataTypes::TEXT),
            1 => Some(MetadataTypes::ARTWORK),
            2 => Some(MetadataTypes::PROGRESS),
            _ => None,
        })
        .fold(MetadataTypes::NONE, BitOr::bitor)
}

/// Parses `sr`/`ch`/`ss` into an [`AudioProperties`] triple, falling back
/// to 44.1kHz/stereo/16-bit for any key that's missing or unparseable.
pub fn parse_audio_properties(properties: &HashMap<String, String>) -> AudioProperties {
    // ---
    let default = AudioProperties::default();

    let sample_rate = properties
        .get("sr")
        .and_then(|v| v.parse().ok())
        .unwrap_or(default.sample_rate);
    let channels = properties
        .get("ch")
        .and_then(|v| v.parse().ok())
        .unwrap_or(default.channels);
    let bytes_per_channel = properties
        .get("ss")
        .and_then(|v| v.parse::<u32>().ok())
        .map(|bits| (bits / 8).clamp(1, 2) as u8)
        .unwrap_or(default.bytes_per_channel);

    AudioProperties {
        sample_rate,
        channels,
        bytes_per_channel,
    }
}
