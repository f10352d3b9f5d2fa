//! # navicar player library (navicar-ap)
//!
//! Streams albums from a Navidrome server to a car audio system.
//!
//! - `catalog`: Navidrome HTTP client (login, albums, songs, stream URLs)
//! - `playback`: state machine, engine loop, audio focus, last-track store
//! - `audio`: symphonia/rubato/cpal streaming player
//! - `host`: foreground host with a persistent now-playing notification
//! - `car`: head-unit browse tree and transport bridge
//! - `coordinator`: serialized session writes (accounts, catalog refresh)
//! - `api`: local HTTP control API with SSE

pub mod api;
pub mod audio;
pub mod car;
pub mod catalog;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod host;
pub mod playback;

pub use error::{Error, Result};
