pub mod fixtures;

use async_trait::async_trait;
use bytes::Bytes;
use cleanroom_core::{Config, ProcessingStatus, StorageBackend};
use cleanroom_processing::SanitizationPipeline;
use cleanroom_status::{StatusResult, StatusStore, StatusUpdate};
use cleanroom_storage::{
    BucketRegistry, Storage, StorageError, StorageProvider, StorageResult, UploadSink,
};
use std::collections::HashMap;
use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const SOURCE_BUCKET: &str = "uploads";
pub const TARGET_BUCKET: &str = "sanitized";

/// Status store holding records in memory. Only seeded ids exist.
#[derive(Default)]
pub struct FakeStatusStore {
    records: Mutex<HashMap<String, Option<StatusUpdate>>>,
    pub writes: AtomicUsize,
}

impl FakeStatusStore {
    pub fn with_records(ids: &[&str]) -> Self {
        let store = Self::default();
        {
            let mut records = store.records.lock().unwrap();
            for id in ids {
                records.insert(id.to_string(), None);
            }
        }
        store
    }

    pub fn status_of(&self, id: &str) -> Option<ProcessingStatus> {
        self.records
            .lock()
            .unwrap()
            .get(id)
            .and_then(|update| update.as_ref().map(|u| u.status))
    }

    pub fn url_of(&self, id: &str) -> Option<String> {
        self.records
            .lock()
            .unwrap()
            .get(id)
            .and_then(|update| update.as_ref().and_then(|u| u.url.clone()))
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StatusStore for FakeStatusStore {
    async fn update_status(&self, object_id: &str, update: &StatusUpdate) -> StatusResult<bool> {
        let mut records = self.records.lock().unwrap();
        match records.get_mut(object_id) {
            Some(record) => {
                *record = Some(update.clone());
                self.writes.fetch_add(1, Ordering::SeqCst);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn describe(&self) -> String {
        "fake/status".to_string()
    }
}

/// In-memory buckets that count lookups and can make uploads to one bucket
/// fail after a number of chunks.
pub struct TestStorage {
    inner: BucketRegistry,
    lookups: AtomicUsize,
    failing_bucket: Option<(String, usize)>,
}

impl TestStorage {
    pub fn new() -> Self {
        Self {
            inner: BucketRegistry::memory(),
            lookups: AtomicUsize::new(0),
            failing_bucket: None,
        }
    }

    /// Uploads to `bucket` fail on chunk number `fail_at` (0-based).
    pub fn failing_uploads(bucket: &str, fail_at: usize) -> Self {
        Self {
            failing_bucket: Some((bucket.to_string(), fail_at)),
            ..Self::new()
        }
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    /// Direct handle that does not count as pipeline I/O.
    pub fn raw(&self, bucket: &str) -> Arc<dyn Storage> {
        self.inner.bucket(bucket).unwrap()
    }

    pub async fn put(&self, bucket: &str, key: &str, content_type: &str, data: Vec<u8>) {
        self.raw(bucket)
            .put_bytes(key, content_type, Bytes::from(data))
            .await
            .unwrap();
    }
}

impl StorageProvider for TestStorage {
    fn bucket(&self, name: &str) -> StorageResult<Arc<dyn Storage>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let storage = self.inner.bucket(name)?;
        match &self.failing_bucket {
            Some((bucket, fail_at)) if bucket == name => Ok(Arc::new(FailingUploads {
                inner: storage,
                fail_at: *fail_at,
            })),
            _ => Ok(storage),
        }
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Memory
    }
}

struct FailingUploads {
    inner: Arc<dyn Storage>,
    fail_at: usize,
}

#[async_trait]
impl Storage for FailingUploads {
    fn bucket(&self) -> &str {
        self.inner.bucket()
    }

    fn backend_type(&self) -> StorageBackend {
        self.inner.backend_type()
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        self.inner.exists(key).await
    }

    async fn content_length(&self, key: &str) -> StorageResult<u64> {
        self.inner.content_length(key).await
    }

    async fn read_range(&self, key: &str, range: Range<u64>) -> StorageResult<Bytes> {
        self.inner.read_range(key, range).await
    }

    async fn start_upload(
        &self,
        key: &str,
        content_type: &str,
    ) -> StorageResult<Box<dyn UploadSink>> {
        let inner = self.inner.start_upload(key, content_type).await?;
        Ok(Box::new(FailingSink {
            inner,
            written: 0,
            fail_at: self.fail_at,
        }))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.inner.delete(key).await
    }

    async fn content_type(&self, key: &str) -> StorageResult<Option<String>> {
        self.inner.content_type(key).await
    }
}

struct FailingSink {
    inner: Box<dyn UploadSink>,
    written: usize,
    fail_at: usize,
}

#[async_trait]
impl UploadSink for FailingSink {
    async fn write_chunk(&mut self, chunk: Bytes) -> StorageResult<()> {
        if self.written == self.fail_at {
            return Err(StorageError::UploadFailed("connection reset".to_string()));
        }
        self.written += 1;
        self.inner.write_chunk(chunk).await
    }

    async fn commit(&mut self) -> StorageResult<u64> {
        self.inner.commit().await
    }

    async fn abort(&mut self) -> StorageResult<()> {
        self.inner.abort().await
    }
}

pub fn test_config(extra: &[(&str, &str)]) -> Arc<Config> {
    let mut vars = vec![
        ("TARGET_BUCKET_NAME", TARGET_BUCKET),
        ("STORAGE_BACKEND", "memory"),
        ("TRANSFER_MAX_RETRIES", "0"),
    ];
    vars.extend_from_slice(extra);

    let config = Config::from_lookup(|key| {
        vars.iter()
            .rev()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.to_string())
    })
    .expect("test config is valid");
    Arc::new(config)
}

pub struct TestPipeline {
    pub pipeline: SanitizationPipeline,
    pub storage: Arc<TestStorage>,
    pub status: Arc<FakeStatusStore>,
}

pub fn setup_test_pipeline(
    extra_env: &[(&str, &str)],
    storage: TestStorage,
    status: FakeStatusStore,
) -> TestPipeline {
    let storage = Arc::new(storage);
    let status = Arc::new(status);
    let pipeline = SanitizationPipeline::new(
        test_config(extra_env),
        storage.clone(),
        Some(status.clone()),
    );

    TestPipeline {
        pipeline,
        storage,
        status,
    }
}
