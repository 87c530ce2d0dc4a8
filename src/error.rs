//! Error types for registry administration.

use thiserror::Error;

/// Result type alias for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Errors that can occur while talking to the registry or its storage.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// The registry answered with something we could not use.
    #[error("unexpected response from server: {0}")]
    Protocol(String),

    #[error("invalid tag: {0}")]
    InvalidTag(String),

    #[error("{0}")]
    Precondition(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
