//! Error types for the Hangar platform

use thiserror::Error;

use crate::blob::BlobError;
use crate::cache::CacheError;
use crate::queue::QueueError;
use crate::store::StoreError;

/// Main error type for the Hangar platform
#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Store error: {0}")]
    StoreError(#[from] StoreError),

    #[error("Queue error: {0}")]
    QueueError(#[from] QueueError),

    #[error("Blob error: {0}")]
    BlobError(#[from] BlobError),

    #[error("Cache error: {0}")]
    CacheError(#[from] CacheError),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for PlatformError {
    fn from(err: anyhow::Error) -> Self {
        PlatformError::Internal(err.to_string())
    }
}
