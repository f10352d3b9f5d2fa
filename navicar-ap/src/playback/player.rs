//! Media player abstraction
//!
//! The engine drives a `MediaPlayer` with plain method calls. Preparation is
//! asynchronous: the player reports back through `PlayerSignal`s tagged with
//! the generation passed to `load`, so a late signal from a replaced track
//! can be told apart from the current one.

use navicar_common::PlayableTrack;
use tokio::sync::mpsc;

/// Asynchronous report from a player
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerSignal {
    /// Track prepared; `duration_ms` is 0 for live streams
    Ready { generation: u64, duration_ms: u64 },
    /// Playback reached the end of the track
    Ended { generation: u64 },
    /// Preparation or rendering failed
    Failed { generation: u64, message: String },
}

impl PlayerSignal {
    pub fn generation(&self) -> u64 {
        match self {
            PlayerSignal::Ready { generation, .. }
            | PlayerSignal::Ended { generation }
            | PlayerSignal::Failed { generation, .. } => *generation,
        }
    }
}

/// Sender half players report on
pub type SignalSender = mpsc::UnboundedSender<PlayerSignal>;

/// A single-track media player
///
/// Calls never block on the network; `load` only starts preparation.
pub trait MediaPlayer: Send + 'static {
    /// Stop whatever is loaded and start preparing `track`
    fn load(&mut self, track: &PlayableTrack, generation: u64);
    fn play(&mut self);
    fn pause(&mut self);
    fn stop(&mut self);
    fn seek(&mut self, position_ms: u64);
    fn position_ms(&self) -> u64;
    /// Furthest position that can be played without waiting
    fn buffered_ms(&self) -> u64;
    /// Free device and network resources; the player is not used again
    fn release(&mut self);
}
