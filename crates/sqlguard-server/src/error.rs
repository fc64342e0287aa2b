//! Server error types.

use sqlguard_core::SecurityError;
use thiserror::Error;

/// Server errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Security pipeline error.
    #[error("security error: {0}")]
    Security(#[from] SecurityError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

/// Result type for server operations.
pub type Result<T> = std::result::Result<T, Error>;
