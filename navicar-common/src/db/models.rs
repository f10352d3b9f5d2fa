//! Database models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stored server login
///
/// At most one account is active and at most one is default at any time.
/// The password is kept so tokens can be re-obtained, but it never leaves
/// the process through serialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Account {
    pub id: i64,
    pub server_url: String,
    pub username: String,
    #[serde(skip_serializing, default)]
    pub password: String,
    pub auth_token: Option<String>,
    #[sqlx(rename = "subsonic_salt")]
    pub streaming_salt: Option<String>,
    #[sqlx(rename = "subsonic_token")]
    pub streaming_token: Option<String>,
    pub is_active: bool,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
}

/// Fields supplied when adding an account
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NewAccount {
    pub server_url: String,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default)]
    pub streaming_salt: Option<String>,
    #[serde(default)]
    pub streaming_token: Option<String>,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub is_default: bool,
}

impl NewAccount {
    pub fn new(
        server_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            server_url: server_url.into(),
            username: username.into(),
            password: password.into(),
            ..Self::default()
        }
    }
}
