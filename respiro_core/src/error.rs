//! Error types for the respiro_core library.

use std::io;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for respiro_core operations
///
/// Sample-level problems (late, duplicate or non-finite samples) are not
/// errors: they are dropped silently because sensor jitter is expected.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error while reading or writing a recording
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation targeted a destroyed or never-created session
    #[error("invalid session handle")]
    InvalidHandle,

    /// Session buffers could not be allocated
    #[error("resource exhaustion: {0}")]
    ResourceExhausted(String),
}
