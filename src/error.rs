// src/error.rs

use thiserror::Error;

/// Core error types for layerscan
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A version string that does not follow the Debian version grammar
    #[error("Invalid version '{version}': {reason}")]
    InvalidVersion { version: String, reason: String },

    /// Malformed input that cannot be processed at all
    #[error("Parse error: {0}")]
    ParseError(String),

    /// No detector registered under the requested name
    #[error("Unknown detector: {0}")]
    UnknownDetector(String),

    /// A file selected for extraction exceeds the configured size limit
    #[error("File {path} is {size} bytes, exceeding the {limit} byte limit")]
    FileTooLarge { path: String, size: u64, limit: u64 },

    /// Layer path does not exist
    #[error("Layer not found at path: {0}")]
    LayerNotFound(String),

    /// Invalid runtime configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),
}

/// Result type alias using layerscan's Error type
pub type Result<T> = std::result::Result<T, Error>;
