//! Playback-related type definitions
//!
//! Supporting types for the playback snapshot published by the engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Playback status enumeration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackStatus {
    /// Nothing loaded yet
    Idle,
    /// Media loading, not yet ready to play
    Buffering,
    /// Audio is being rendered
    Playing,
    /// Ready, holding position
    Paused,
    /// Media stopped (or ended); engine still alive
    Stopped,
    /// Player failure; terminal until the next load
    Error,
}

impl std::fmt::Display for PlaybackStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackStatus::Idle => write!(f, "idle"),
            PlaybackStatus::Buffering => write!(f, "buffering"),
            PlaybackStatus::Playing => write!(f, "playing"),
            PlaybackStatus::Paused => write!(f, "paused"),
            PlaybackStatus::Stopped => write!(f, "stopped"),
            PlaybackStatus::Error => write!(f, "error"),
        }
    }
}

/// Transport action a client may currently offer
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackAction {
    Play,
    Pause,
    SkipNext,
    SkipPrev,
    Stop,
    SeekTo,
}

/// Immutable playback state snapshot
///
/// Owned by the playback engine; observers only ever receive copies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackSnapshot {
    pub status: PlaybackStatus,
    /// Media id of the loaded track
    pub media_id: Option<String>,
    /// Title of the loaded track
    pub title: Option<String>,
    /// Secondary line of the loaded track (artist)
    pub subtitle: Option<String>,
    pub position_ms: u64,
    /// Track length; 0 means unbounded/live
    pub duration_ms: u64,
    pub buffered_position_ms: u64,
    pub available_actions: BTreeSet<PlaybackAction>,
    /// Set only in the `Error` state
    pub error_message: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl PlaybackSnapshot {
    /// Snapshot of a freshly created engine
    pub fn idle() -> Self {
        Self {
            status: PlaybackStatus::Idle,
            media_id: None,
            title: None,
            subtitle: None,
            position_ms: 0,
            duration_ms: 0,
            buffered_position_ms: 0,
            available_actions: [PlaybackAction::Play].into_iter().collect(),
            error_message: None,
            updated_at: Utc::now(),
        }
    }

    /// True when the track has no known length
    pub fn is_stream(&self) -> bool {
        self.duration_ms == 0
    }

    pub fn allows(&self, action: PlaybackAction) -> bool {
        self.available_actions.contains(&action)
    }
}

impl Default for PlaybackSnapshot {
    fn default() -> Self {
        Self::idle()
    }
}

/// Reason a transport command was refused
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Seek/skip on a stream with unknown duration
    UnboundedStream,
    /// Command not valid in the current status
    InvalidState,
    /// Nothing to resume
    NothingToPlay,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::UnboundedStream => write!(f, "unbounded stream"),
            RejectReason::InvalidState => write!(f, "invalid state"),
            RejectReason::NothingToPlay => write!(f, "nothing to play"),
        }
    }
}
