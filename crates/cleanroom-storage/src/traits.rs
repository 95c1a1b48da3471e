//! Storage abstraction traits
//!
//! A [`Storage`] handle is scoped to one bucket. Handles are resolved by name
//! through a [`StorageProvider`], so the pipeline can read from the bucket named
//! in a trigger event and write to the configured target bucket.

use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use std::ops::Range;
use std::sync::Arc;
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
    /// Whether repeating the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StorageError::DownloadFailed(_)
                | StorageError::UploadFailed(_)
                | StorageError::BackendError(_)
                | StorageError::IoError(_)
        )
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Bucket-scoped blob storage.
///
/// Keys are object names exactly as they appear in trigger events. They must
/// not be empty or start with `/`.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Name of the bucket this handle reads and writes.
    fn bucket(&self) -> &str;

    /// Get the storage backend type
    fn backend_type(&self) -> StorageBackend;

    /// Check if an object exists
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Size in bytes of an existing object.
    async fn content_length(&self, key: &str) -> StorageResult<u64>;

    /// Read the bytes in `range` (end exclusive). Reading past the end of the
    /// object is an error, not a short read.
    async fn read_range(&self, key: &str, range: Range<u64>) -> StorageResult<Bytes>;

    /// Begin a resumable upload. Nothing is visible at `key` until the returned
    /// sink is committed.
    async fn start_upload(&self, key: &str, content_type: &str)
        -> StorageResult<Box<dyn UploadSink>>;

    /// Delete an object. Deleting a missing object is not an error.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Content type recorded when the object was uploaded, if any.
    async fn content_type(&self, key: &str) -> StorageResult<Option<String>>;

    /// Upload a complete buffer through a single-chunk session.
    async fn put_bytes(&self, key: &str, content_type: &str, data: Bytes) -> StorageResult<u64> {
        let mut sink = self.start_upload(key, content_type).await?;
        if let Err(e) = sink.write_chunk(data).await {
            let _ = sink.abort().await;
            return Err(e);
        }
        sink.commit().await
    }

    /// Read a whole object into memory.
    async fn get_bytes(&self, key: &str) -> StorageResult<Bytes> {
        let len = self.content_length(key).await?;
        if len == 0 {
            return Ok(Bytes::new());
        }
        self.read_range(key, 0..len).await
    }
}

/// Destination side of a resumable upload.
///
/// Chunks are appended in call order. After `commit` or `abort` the sink must
/// not be used again.
#[async_trait]
pub trait UploadSink: Send {
    /// Append the next chunk.
    async fn write_chunk(&mut self, chunk: Bytes) -> StorageResult<()>;

    /// Make the object visible and return the number of bytes written.
    async fn commit(&mut self) -> StorageResult<u64>;

    /// Discard everything written so far.
    async fn abort(&mut self) -> StorageResult<()>;
}

/// Resolves bucket names to storage handles.
pub trait StorageProvider: Send + Sync {
    fn bucket(&self, name: &str) -> StorageResult<Arc<dyn Storage>>;

    fn backend_type(&self) -> StorageBackend;
}

/// Shared key check used by every backend. Dots are ordinary characters in
/// object names; the filesystem backend adds its own traversal check.
pub(crate) fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey("Storage key is empty".to_string()));
    }
    if key.starts_with('/') {
        return Err(StorageError::InvalidKey(
            "Storage key must not start with '/'".to_string(),
        ));
    }
    Ok(())
}
