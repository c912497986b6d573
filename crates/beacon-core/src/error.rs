//! Unified error types for Beacon

use thiserror::Error;

/// Unified error type for all Beacon core operations
#[derive(Error, Debug)]
pub enum BeaconError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Upload queue errors
    #[error("Upload protocol violation: {0}")]
    UploadProtocol(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(String),
}

/// Result type alias using BeaconError
pub type Result<T> = std::result::Result<T, BeaconError>;
