use crate::traits::{validate_key, Storage, StorageError, StorageResult, UploadSink};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::Error as ObjectStoreError;
use object_store::{
    Attribute, Attributes, GetOptions, MultipartUpload, ObjectStore, ObjectStoreExt,
    PutMultipartOptions, PutPayload, Result as ObjectResult,
};
use std::ops::Range;
use std::sync::Arc;

/// Bucket handle backed by an `object_store` client (GCS, S3 or in-memory).
#[derive(Clone)]
pub struct ObjectStorage {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    backend: StorageBackend,
}

impl ObjectStorage {
    /// Google Cloud Storage bucket, credentials taken from the environment
    /// (`GOOGLE_APPLICATION_CREDENTIALS` or the metadata server).
    pub fn gcs(bucket: impl Into<String>) -> StorageResult<Self> {
        let bucket = bucket.into();
        let store = GoogleCloudStorageBuilder::from_env()
            .with_bucket_name(bucket.clone())
            .build()
            .map_err(|e| StorageError::ConfigError(e.to_string()))?;

        Ok(Self {
            store: Arc::new(store),
            bucket,
            backend: StorageBackend::Gcs,
        })
    }

    /// S3 or S3-compatible bucket.
    ///
    /// # Arguments
    /// * `bucket` - S3 bucket name
    /// * `region` - AWS region (or region identifier for S3-compatible providers)
    /// * `endpoint_url` - Optional custom endpoint URL (e.g., "http://localhost:9000" for MinIO)
    pub fn s3(
        bucket: impl Into<String>,
        region: impl Into<String>,
        endpoint_url: Option<String>,
    ) -> StorageResult<Self> {
        let bucket = bucket.into();
        let mut builder = AmazonS3Builder::from_env()
            .with_region(region.into())
            .with_bucket_name(bucket.clone());

        if let Some(endpoint) = endpoint_url {
            let allow_http = endpoint.starts_with("http://");
            builder = builder.with_endpoint(endpoint).with_allow_http(allow_http);
        }

        let store = builder
            .build()
            .map_err(|e| StorageError::ConfigError(e.to_string()))?;

        Ok(Self {
            store: Arc::new(store),
            bucket,
            backend: StorageBackend::S3,
        })
    }

    /// Wrap an existing store; used by the memory backend.
    pub fn with_store(
        bucket: impl Into<String>,
        store: Arc<dyn ObjectStore>,
        backend: StorageBackend,
    ) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            backend,
        }
    }

    /// Fresh in-memory bucket.
    pub fn in_memory(bucket: impl Into<String>) -> Self {
        Self::with_store(bucket, Arc::new(InMemory::new()), StorageBackend::Memory)
    }

    fn location(key: &str) -> StorageResult<Path> {
        validate_key(key)?;
        Ok(Path::from(key))
    }

    fn map_read_error(&self, key: &str, e: ObjectStoreError) -> StorageError {
        match e {
            ObjectStoreError::NotFound { .. } => StorageError::NotFound(key.to_string()),
            other => StorageError::DownloadFailed(other.to_string()),
        }
    }
}

#[async_trait]
impl Storage for ObjectStorage {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    fn backend_type(&self) -> StorageBackend {
        self.backend
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let location = Self::location(key)?;
        match self.store.head(&location).await {
            Ok(_) => Ok(true),
            Err(ObjectStoreError::NotFound { .. }) => Ok(false),
            Err(e) => Err(StorageError::BackendError(e.to_string())),
        }
    }

    async fn content_length(&self, key: &str) -> StorageResult<u64> {
        let location = Self::location(key)?;
        let result: ObjectResult<_> = self.store.head(&location).await;
        let meta = result.map_err(|e| match e {
            ObjectStoreError::NotFound { .. } => StorageError::NotFound(key.to_string()),
            other => StorageError::BackendError(other.to_string()),
        })?;
        Ok(meta.size)
    }

    async fn read_range(&self, key: &str, range: Range<u64>) -> StorageResult<Bytes> {
        let location = Self::location(key)?;
        let expected = range.end.saturating_sub(range.start);
        let start = std::time::Instant::now();

        let result: ObjectResult<_> = self.store.get_range(&location, range.clone()).await;
        let bytes = result.map_err(|e| {
            tracing::debug!(
                error = %e,
                bucket = %self.bucket,
                key = %key,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "Ranged read failed"
            );
            self.map_read_error(key, e)
        })?;

        // Some stores clamp ranges that run past the end of the object.
        if bytes.len() as u64 != expected {
            return Err(StorageError::DownloadFailed(format!(
                "Short read of {}..{} from {}/{}: got {} bytes",
                range.start,
                range.end,
                self.bucket,
                key,
                bytes.len()
            )));
        }

        Ok(bytes)
    }

    async fn start_upload(
        &self,
        key: &str,
        content_type: &str,
    ) -> StorageResult<Box<dyn UploadSink>> {
        let location = Self::location(key)?;
        let opts = PutMultipartOptions {
            attributes: Attributes::from_iter([(
                Attribute::ContentType,
                content_type.to_owned(),
            )]),
            ..Default::default()
        };
        let result: ObjectResult<_> = self.store.put_multipart_opts(&location, opts).await;
        let upload = result.map_err(|e| {
            tracing::error!(
                error = %e,
                bucket = %self.bucket,
                key = %key,
                "Failed to start multipart upload"
            );
            StorageError::UploadFailed(e.to_string())
        })?;

        Ok(Box::new(ObjectUploadSink {
            key: key.to_string(),
            upload,
            parts: 0,
            written: 0,
        }))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let start = std::time::Instant::now();
        let location = Self::location(key)?;

        let result: ObjectResult<_> = self.store.delete(&location).await;

        match result {
            Ok(()) | Err(ObjectStoreError::NotFound { .. }) => {}
            Err(e) => {
                tracing::error!(
                    error = %e,
                    bucket = %self.bucket,
                    key = %key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Object delete failed"
                );
                return Err(StorageError::DeleteFailed(e.to_string()));
            }
        }

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Object delete successful"
        );

        Ok(())
    }

    async fn content_type(&self, key: &str) -> StorageResult<Option<String>> {
        let location = Self::location(key)?;
        let opts = GetOptions {
            head: true,
            ..Default::default()
        };
        let result: ObjectResult<_> = self.store.get_opts(&location, opts).await;
        let found = result.map_err(|e| self.map_read_error(key, e))?;
        Ok(found
            .attributes
            .get(&Attribute::ContentType)
            .map(|value| value.as_ref().to_owned()))
    }
}

/// One multipart upload; each chunk becomes one part.
struct ObjectUploadSink {
    key: String,
    upload: Box<dyn MultipartUpload>,
    parts: usize,
    written: u64,
}

#[async_trait]
impl UploadSink for ObjectUploadSink {
    async fn write_chunk(&mut self, chunk: Bytes) -> StorageResult<()> {
        let len = chunk.len() as u64;
        self.upload
            .put_part(PutPayload::from(chunk))
            .await
            .map_err(|e| {
                StorageError::UploadFailed(format!(
                    "Part {} of {} failed: {}",
                    self.parts, self.key, e
                ))
            })?;
        self.parts += 1;
        self.written += len;
        Ok(())
    }

    async fn commit(&mut self) -> StorageResult<u64> {
        // A multipart upload needs at least one part, even for an empty object.
        if self.parts == 0 {
            self.write_chunk(Bytes::new()).await?;
        }

        self.upload
            .complete()
            .await
            .map_err(|e| StorageError::UploadFailed(format!("Commit of {} failed: {}", self.key, e)))?;

        Ok(self.written)
    }

    async fn abort(&mut self) -> StorageResult<()> {
        self.upload
            .abort()
            .await
            .map_err(|e| StorageError::BackendError(format!("Abort of {} failed: {}", self.key, e)))
    }
}
