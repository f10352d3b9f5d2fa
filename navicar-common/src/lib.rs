//! # navicar common library
//!
//! Shared code for the navicar player:
//! - Account store and settings (SQLite)
//! - Session configuration snapshot
//! - Event types and the `EventBus`
//! - Navidrome catalog DTOs (albums, songs, login)
//! - Configuration loading
//! - Timestamp helpers

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod media;
pub mod session;
pub mod time;

pub use error::{Error, Result};
pub use media::PlayableTrack;
pub use session::{SessionConfig, SessionManager, SessionPatch};
