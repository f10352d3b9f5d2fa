//! Navidrome API types
//!
//! Wire types for the subset of the Navidrome native API the player uses:
//! `POST /auth/login`, `GET /api/album` and `GET /api/song`.
//!
//! This module contains ONLY plain serde types; the HTTP client lives in
//! `navicar-ap`.

pub mod types;

pub use types::{Album, Genre, LoginRequest, LoginResponse, Participant, Participants, Song};
