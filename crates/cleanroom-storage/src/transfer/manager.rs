use super::session::{SessionError, TransferSession};
use super::staging::{StagedContent, StagingBuffer, StagingTarget};
use crate::traits::{Storage, StorageError, UploadSink};
use bytes::Bytes;
use cleanroom_core::TransferRetryConfig;
use std::ops::Range;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use thiserror::Error;

const MAX_RETRY_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("Source object not found: {bucket}/{key}")]
    SourceMissing { bucket: String, key: String },

    #[error("Download of {key} failed at chunk {chunk}: {source}")]
    Download {
        key: String,
        chunk: u64,
        #[source]
        source: StorageError,
    },

    #[error("Upload of {key} failed at chunk {chunk}: {source}")]
    Upload {
        key: String,
        chunk: u64,
        #[source]
        source: StorageError,
    },

    #[error("Transfer session error: {0}")]
    Session(#[from] SessionError),

    #[error("Staging buffer error: {0}")]
    Staging(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl TransferError {
    /// Whether the whole transfer could succeed if attempted again later.
    pub fn is_transient(&self) -> bool {
        match self {
            TransferError::Download { source, .. } | TransferError::Upload { source, .. } => {
                source.is_transient()
            }
            TransferError::Storage(source) => source.is_transient(),
            TransferError::Staging(_) => true,
            TransferError::SourceMissing { .. } | TransferError::Session(_) => false,
        }
    }
}

/// Bounded exponential backoff for idempotent chunk reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Single attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(MAX_RETRY_DELAY)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        TransferRetryConfig::default().into()
    }
}

impl From<TransferRetryConfig> for RetryPolicy {
    fn from(config: TransferRetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
        }
    }
}

/// Moves objects between storage and staging buffers in fixed-size chunks.
#[derive(Debug, Clone, Default)]
pub struct TransferManager {
    retry: RetryPolicy,
    spool_dir: Option<PathBuf>,
}

impl TransferManager {
    pub fn new(retry: RetryPolicy, spool_dir: Option<PathBuf>) -> Self {
        Self { retry, spool_dir }
    }

    pub fn spool_dir(&self) -> Option<&std::path::Path> {
        self.spool_dir.as_deref()
    }

    /// Download `key` chunk by chunk into a staging buffer.
    ///
    /// `declared_size` is the size from the trigger event; the transfer itself
    /// uses the size storage reports.
    pub async fn download(
        &self,
        storage: &dyn Storage,
        key: &str,
        declared_size: u64,
        target: StagingTarget,
    ) -> Result<StagedContent, TransferError> {
        let start = Instant::now();

        if !storage.exists(key).await? {
            return Err(TransferError::SourceMissing {
                bucket: storage.bucket().to_string(),
                key: key.to_string(),
            });
        }

        let total_size = storage.content_length(key).await?;
        if total_size != declared_size {
            tracing::warn!(
                bucket = %storage.bucket(),
                key = %key,
                declared_size,
                actual_size = total_size,
                "Object size differs from trigger event"
            );
        }

        let mut session = TransferSession::new(total_size);
        let mut buffer = StagingBuffer::new(target, total_size, self.spool_dir())?;

        while let Some(range) = session.next_range() {
            let chunk_index = session.current_chunk();
            let chunk = match self.read_chunk(storage, key, range, chunk_index).await {
                Ok(chunk) => chunk,
                Err(source) => {
                    session.abort();
                    return Err(TransferError::Download {
                        key: key.to_string(),
                        chunk: chunk_index,
                        source,
                    });
                }
            };

            session.record_chunk(chunk.len() as u64)?;
            buffer.append(&chunk).await?;

            tracing::debug!(
                bucket = %storage.bucket(),
                key = %key,
                chunk = chunk_index + 1,
                chunks = session.chunk_count(),
                "Downloaded chunk"
            );
        }

        tracing::info!(
            bucket = %storage.bucket(),
            key = %key,
            size_bytes = total_size,
            chunk_size = session.chunk_size(),
            staged_on_disk = target == StagingTarget::TempFile,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Download complete"
        );

        Ok(buffer.finish())
    }

    /// Upload staged content to `key` through one resumable session.
    ///
    /// Returns the number of bytes committed. On any error the upload is
    /// aborted and nothing becomes visible at `key`.
    pub async fn upload(
        &self,
        storage: &dyn Storage,
        key: &str,
        content_type: &str,
        content: &StagedContent,
    ) -> Result<u64, TransferError> {
        let start = Instant::now();
        let mut session = TransferSession::new(content.len());

        let mut sink = storage
            .start_upload(key, content_type)
            .await
            .map_err(|source| TransferError::Upload {
                key: key.to_string(),
                chunk: 0,
                source,
            })?;

        if let Err(e) = self.send_chunks(&mut session, sink.as_mut(), key, content).await {
            session.abort();
            abort_upload(sink.as_mut(), storage.bucket(), key).await;
            return Err(e);
        }

        let written = match sink.commit().await {
            Ok(written) => written,
            Err(source) => {
                abort_upload(sink.as_mut(), storage.bucket(), key).await;
                return Err(TransferError::Upload {
                    key: key.to_string(),
                    chunk: session.current_chunk(),
                    source,
                });
            }
        };

        tracing::info!(
            bucket = %storage.bucket(),
            key = %key,
            size_bytes = written,
            chunks = session.current_chunk(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Upload committed"
        );

        Ok(written)
    }

    async fn send_chunks(
        &self,
        session: &mut TransferSession,
        sink: &mut dyn UploadSink,
        key: &str,
        content: &StagedContent,
    ) -> Result<(), TransferError> {
        while let Some(range) = session.next_range() {
            let chunk_index = session.current_chunk();
            let chunk = content.read_range(range).await?;
            let len = chunk.len() as u64;

            // Parts cannot be re-sent in place, so a failed chunk fails the upload.
            sink.write_chunk(chunk)
                .await
                .map_err(|source| TransferError::Upload {
                    key: key.to_string(),
                    chunk: chunk_index,
                    source,
                })?;

            session.record_chunk(len)?;
        }
        Ok(())
    }

    async fn read_chunk(
        &self,
        storage: &dyn Storage,
        key: &str,
        range: Range<u64>,
        chunk_index: u64,
    ) -> Result<Bytes, StorageError> {
        let mut attempt = 0;
        loop {
            match storage.read_range(key, range.clone()).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) if e.is_transient() && attempt < self.retry.max_retries => {
                    attempt += 1;
                    let delay = self.retry.delay_for(attempt);
                    tracing::warn!(
                        error = %e,
                        bucket = %storage.bucket(),
                        key = %key,
                        chunk = chunk_index,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Chunk read failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

async fn abort_upload(sink: &mut dyn UploadSink, bucket: &str, key: &str) {
    if let Err(e) = sink.abort().await {
        tracing::warn!(error = %e, bucket = %bucket, key = %key, "Failed to abort upload");
    }
}
