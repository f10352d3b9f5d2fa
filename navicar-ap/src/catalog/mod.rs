//! Remote catalog client
//!
//! Talks to the Navidrome native API (login, albums, songs) and builds the
//! Subsonic-style stream and cover-art URLs. Listing calls are fail-soft:
//! transport, status and parse failures are logged and yield empty results.
//! `try_*` variants expose the underlying error.

mod client;

pub use client::{CatalogClient, CatalogCredentials, SUBSONIC_API_VERSION};

use thiserror::Error;

/// Catalog client errors
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Network error: {0}")]
    Network(String),

    /// Login rejected, or token refused
    #[error("Authentication failed ({0}): {1}")]
    Auth(u16, String),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),

    /// Required session fields are missing
    #[error("Catalog not configured: {0}")]
    NotConfigured(String),
}

impl CatalogError {
    /// HTTP status the server answered with, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            CatalogError::Auth(status, _) | CatalogError::Api(status, _) => Some(*status),
            _ => None,
        }
    }
}
