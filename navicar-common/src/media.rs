//! Playable media descriptors

use serde::{Deserialize, Serialize};

/// A resolved, ready-to-play stream
///
/// Derived on demand from an album by resolving its first song. A
/// `duration_ms` of 0 means the length is unknown, which the engine treats as
/// an unbounded live stream (no seek, no skip).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayableTrack {
    /// Identifier the track is browsed and persisted by (the album id)
    pub media_id: String,
    /// Title shown by UIs and the notification
    pub title: String,
    /// Secondary line (artist)
    #[serde(default)]
    pub subtitle: Option<String>,
    /// Cover art URL
    #[serde(default)]
    pub artwork_url: Option<String>,
    /// Stream URL handed to the media player
    pub stream_uri: String,
    /// Length in milliseconds (0 = unknown/live)
    #[serde(default)]
    pub duration_ms: u64,
}

impl PlayableTrack {
    pub fn new(media_id: impl Into<String>, title: impl Into<String>, stream_uri: impl Into<String>) -> Self {
        Self {
            media_id: media_id.into(),
            title: title.into(),
            subtitle: None,
            artwork_url: None,
            stream_uri: stream_uri.into(),
            duration_ms: 0,
        }
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn with_subtitle(mut self, subtitle: impl Into<String>) -> Self {
        self.subtitle = Some(subtitle.into());
        self
    }

    pub fn with_artwork(mut self, artwork_url: Option<String>) -> Self {
        self.artwork_url = artwork_url;
        self
    }

    /// True when the length is unknown (live stream)
    pub fn is_live(&self) -> bool {
        self.duration_ms == 0
    }
}
