//! A logging `RaopListener` (spec.md §6): prints `playing`/`stopped`
//! transitions instead of, say, updating a now-playing widget.

use raop::metadata::PlaybackInfo;
use raop::RaopListener;
use tracing::info;

#[derive(Default)]
pub struct LoggingListener;

impl RaopListener for LoggingListener {
    fn playing(&self, playback_info: PlaybackInfo) {
        info!(
            "playing: {} - {} ({}) @ {:.1}s",
            playback_info.metadata.artist,
            playback_info.metadata.title,
            playback_info.metadata.album,
            playback_info.position
        );
    }

    fn stopped(&self) {
        info!("stopped");
    }
}
