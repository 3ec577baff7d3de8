//! Track metadata surfaced to the receiver and to the listener.

/// Metadata describing the track currently streaming. Sent to the
/// receiver via `SET_METADATA` when the Text metadata type is supported.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AudioMetadata {
    // ---
    pub title: String,
    pub artist: String,
    pub album: String,
}

impl AudioMetadata {
    // ---
    pub fn new(title: impl Into<String>, artist: impl Into<String>, album: impl Into<String>) -> Self {
        // ---
        Self {
            title: title.into(),
            artist: artist.into(),
            album: album.into(),
        }
    }

    /// `true` when no caller ever supplied metadata for this session.
    pub fn is_empty(&self) -> bool {
        // ---
        *self == AudioMetadata::default()
    }

    /// The placeholder used in place of caller-supplied metadata so a
    /// listener always sees a populated snapshot.
    pub fn placeholder() -> Self {
        // ---
        Self::new("Streaming", "raop", "RAOP")
    }
}

/// A point-in-time snapshot handed to the listener's `playing` callback.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackInfo {
    // ---
    pub metadata: AudioMetadata,
    /// Elapsed seconds since playback start.
    pub position: f64,
}
