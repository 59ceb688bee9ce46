//! Storage abstraction trait
//!
//! This module defines the Storage trait that all storage backends must implement.

use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use pawprint_core::PipelineError;
use std::time::Duration;
use thiserror::Error;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}

impl From<StorageError> for PipelineError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(key) => PipelineError::SourceNotFound(key),
            StorageError::InvalidKey(msg) => PipelineError::Validation(msg),
            other => PipelineError::TransientStore(other.to_string()),
        }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Object store gateway.
///
/// Writes are whole-object overwrites, so writing the same key twice is safe.
/// Deleting a key that does not exist succeeds.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Read an object. Missing keys yield `StorageError::NotFound`.
    async fn get(&self, key: &str) -> StorageResult<Bytes>;

    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> StorageResult<()>;

    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Time-bounded, read-only URL for the object.
    async fn presign(&self, key: &str, expires_in: Duration) -> StorageResult<String>;

    async fn exists(&self, key: &str) -> StorageResult<bool>;

    fn backend_type(&self) -> StorageBackend;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_source_not_found() {
        let err: PipelineError = StorageError::NotFound("dogs/d1/a.jpg".to_string()).into();
        assert_eq!(err, PipelineError::SourceNotFound("dogs/d1/a.jpg".to_string()));
        assert!(err.is_recoverable());
    }

    #[test]
    fn backend_failures_are_transient() {
        let err: PipelineError = StorageError::UploadFailed("503 Slow Down".to_string()).into();
        assert!(matches!(err, PipelineError::TransientStore(_)));

        let err: PipelineError = StorageError::InvalidKey("..".to_string()).into();
        assert!(!err.is_recoverable());
    }
}
