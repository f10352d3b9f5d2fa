//! Navidrome request/response types
//!
//! Field names follow the Navidrome JSON (camelCase). Every field the player
//! does not strictly need carries a serde default so that servers omitting it
//! still deserialize.

use serde::{Deserialize, Serialize};

// ========================================
// Authentication Types
// ========================================

/// Body of `POST /auth/login`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Successful `POST /auth/login` response
///
/// `token` authenticates native API calls (`X-ND-Authorization: Bearer`);
/// `subsonic_salt`/`subsonic_token` authenticate stream and cover-art URLs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    #[serde(default)]
    pub subsonic_salt: Option<String>,
    #[serde(default)]
    pub subsonic_token: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
}

// ========================================
// Catalog Types
// ========================================

/// Album genre entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Genre {
    pub id: String,
    pub name: String,
}

/// Album participant (artist, album artist or composer)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub missing: bool,
}

/// Album participants grouped by role
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Participants {
    #[serde(default)]
    pub albumartist: Vec<Participant>,
    #[serde(default)]
    pub artist: Vec<Participant>,
    #[serde(default)]
    pub composer: Vec<Participant>,
}

/// Album as returned by `GET /api/album`
///
/// Immutable once fetched; the catalog is re-fetched wholesale. The only
/// field filled in locally is `cover_art_url`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Album {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub cover_art_url: Option<String>,
    #[serde(default)]
    pub album_artist: String,
    #[serde(default)]
    pub play_count: Option<i64>,
    #[serde(default)]
    pub play_date: Option<String>,
    #[serde(default)]
    pub starred_at: Option<String>,
    #[serde(default)]
    pub library_id: i64,
    #[serde(default)]
    pub library_name: String,
    #[serde(default)]
    pub max_year: i32,
    #[serde(default)]
    pub min_year: i32,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub release_date: String,
    #[serde(default)]
    pub compilation: bool,
    #[serde(default)]
    pub song_count: i64,
    /// Total duration in seconds
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub size: i64,
    #[serde(default)]
    pub genre: String,
    #[serde(default)]
    pub genres: Vec<Genre>,
    #[serde(default)]
    pub participants: Participants,
    #[serde(default)]
    pub missing: bool,
    #[serde(default)]
    pub imported_at: String,
    /// ISO-8601 creation timestamp; the catalog sort key
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

/// Song as returned by `GET /api/song`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Song {
    pub id: String,
    #[serde(alias = "name")]
    pub title: String,
    #[serde(default)]
    pub track_number: i32,
    /// Duration in seconds
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub album_id: Option<String>,
}

impl Song {
    /// Duration in whole milliseconds (0 when the server reports none)
    pub fn duration_ms(&self) -> u64 {
        if self.duration.is_finite() && self.duration > 0.0 {
            (self.duration * 1000.0).round() as u64
        } else {
            0
        }
    }
}
