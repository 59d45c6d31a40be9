//! Error types for yoda-player
//!
//! Defines module-specific error types using thiserror for clear error propagation.

use crate::backend::BackendError;
use thiserror::Error;

/// Main error type for yoda-player
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file loading or validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Track catalog document missing or unparsable
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// Player backend command failed
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// HTTP server errors
    #[error("HTTP server error: {0}")]
    Http(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The session controller task is no longer running
    #[error("Session controller has shut down")]
    ControllerClosed,
}

impl From<yoda_common::Error> for Error {
    fn from(err: yoda_common::Error) -> Self {
        match err {
            yoda_common::Error::Io(e) => Error::Io(e),
            other => Error::Config(other.to_string()),
        }
    }
}

/// Convenience Result type using yoda-player Error
pub type Result<T> = std::result::Result<T, Error>;
