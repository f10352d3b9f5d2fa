//! Error types for navicar-ap
//!
//! Defines module-specific error types using thiserror for clear error propagation.

use crate::catalog::CatalogError;
use thiserror::Error;

/// Main error type for navicar-ap
#[derive(Error, Debug)]
pub enum Error {
    /// Account store, settings or configuration errors from navicar-common
    #[error(transparent)]
    Common(#[from] navicar_common::Error),

    /// Remote catalog errors
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Playback engine errors (engine gone, command channel closed)
    #[error("Playback error: {0}")]
    Playback(String),

    /// Audio output device errors
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    /// Audio decoding errors
    #[error("Audio decode error: {0}")]
    Decode(String),

    /// HTTP server errors
    #[error("HTTP server error: {0}")]
    Http(String),

    /// Invalid state for operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid request
    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        Error::Common(navicar_common::Error::Database(e))
    }
}

/// Convenience Result type using navicar-ap Error
pub type Result<T> = std::result::Result<T, Error>;
