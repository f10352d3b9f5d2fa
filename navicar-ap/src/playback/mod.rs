//! Playback engine
//!
//! - `machine`: pure transition rules
//! - `engine`: async loop executing the machine's commands
//! - `player`: media player trait and its signals
//! - `focus`: audio focus trait and the in-process arbiter
//! - `store`: last-played track persistence

pub mod engine;
pub mod focus;
pub mod machine;
pub mod player;
pub mod store;

pub use engine::{EngineParts, EngineSettings, PlaybackEngine, PlaybackHandle};
pub use focus::{AudioFocus, FocusArbiter, FocusChange, FocusRequestResult, Interruption};
pub use machine::{Command, Input, MachineSettings, PlaybackMachine};
pub use player::{MediaPlayer, PlayerSignal, SignalSender};
pub use store::{LastTrackStore, SqliteLastTrackStore};
