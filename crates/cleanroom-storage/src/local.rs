use crate::traits::{validate_key, Storage, StorageError, StorageResult, UploadSink};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use std::ops::Range;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, SeekFrom};
use uuid::Uuid;

/// Directory under the root holding one content-type file per object.
const CONTENT_TYPES_DIR: &str = ".content-types";

/// Local filesystem storage for one bucket.
///
/// Each bucket is a directory under the configured root; object names map to
/// relative paths inside it. Content types live in a parallel tree below
/// `<root>/.content-types/<bucket>`.
#[derive(Clone, Debug)]
pub struct LocalStorage {
    base_path: PathBuf,
    meta_path: PathBuf,
    bucket: String,
}

/// Object names are relative paths; a `..` segment would leave the bucket.
fn validate_local_key(key: &str) -> StorageResult<()> {
    validate_key(key)?;
    if key.split(['/', '\\']).any(|segment| segment == "..") {
        return Err(StorageError::InvalidKey(format!(
            "Storage key {} escapes the bucket directory",
            key
        )));
    }
    Ok(())
}

impl LocalStorage {
    /// Create a new LocalStorage instance
    ///
    /// # Arguments
    /// * `root` - Root directory shared by all buckets (e.g., "/var/lib/cleanroom")
    /// * `bucket` - Bucket name, used as the directory below `root`
    pub fn new(root: impl AsRef<Path>, bucket: impl Into<String>) -> StorageResult<Self> {
        let bucket = bucket.into();
        validate_local_key(&bucket)?;
        let base_path = root.as_ref().join(&bucket);
        let meta_path = root.as_ref().join(CONTENT_TYPES_DIR).join(&bucket);

        std::fs::create_dir_all(&base_path).map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create storage directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        Ok(LocalStorage {
            base_path,
            meta_path,
            bucket,
        })
    }

    /// Convert storage key to filesystem path with security validation
    ///
    /// Rejects keys that could escape the bucket directory.
    fn key_to_path(&self, key: &str) -> StorageResult<PathBuf> {
        validate_local_key(key)?;

        let path = self.base_path.join(key);

        let base_canonical = self.base_path.canonicalize().map_err(|e| {
            StorageError::ConfigError(format!("Failed to canonicalize base path: {}", e))
        })?;

        // Symlinks inside the bucket may still point elsewhere.
        if let Ok(canonical) = path.canonicalize() {
            if canonical.strip_prefix(&base_canonical).is_err() {
                return Err(StorageError::InvalidKey(
                    "Storage key resolves outside storage directory".to_string(),
                ));
            }
        }

        Ok(path)
    }

    fn content_type_path(&self, key: &str) -> StorageResult<PathBuf> {
        validate_local_key(key)?;
        Ok(self.meta_path.join(key))
    }

    async fn ensure_parent_dir(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Storage for LocalStorage {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.key_to_path(key)?;
        match fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::BackendError(e.to_string())),
        }
    }

    async fn content_length(&self, key: &str) -> StorageResult<u64> {
        let path = self.key_to_path(key)?;
        match fs::metadata(&path).await {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(StorageError::BackendError(e.to_string())),
        }
    }

    async fn read_range(&self, key: &str, range: Range<u64>) -> StorageResult<Bytes> {
        let path = self.key_to_path(key)?;
        if range.end < range.start {
            return Err(StorageError::DownloadFailed(format!(
                "Invalid range {}..{}",
                range.start, range.end
            )));
        }

        let mut file = match fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(key.to_string()));
            }
            Err(e) => {
                return Err(StorageError::DownloadFailed(format!(
                    "Failed to open file {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        file.seek(SeekFrom::Start(range.start)).await?;
        let mut buf = vec![0u8; (range.end - range.start) as usize];
        file.read_exact(&mut buf).await.map_err(|e| {
            StorageError::DownloadFailed(format!(
                "Failed to read {}..{} from {}: {}",
                range.start,
                range.end,
                path.display(),
                e
            ))
        })?;

        Ok(Bytes::from(buf))
    }

    async fn start_upload(
        &self,
        key: &str,
        content_type: &str,
    ) -> StorageResult<Box<dyn UploadSink>> {
        let final_path = self.key_to_path(key)?;
        let content_type_path = self.content_type_path(key)?;
        self.ensure_parent_dir(&final_path).await?;

        let file_name = final_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| StorageError::InvalidKey(key.to_string()))?;
        let partial_path =
            final_path.with_file_name(format!("{}.{}.partial", file_name, Uuid::new_v4()));

        let file = fs::File::create(&partial_path).await.map_err(|e| {
            StorageError::UploadFailed(format!(
                "Failed to create file {}: {}",
                partial_path.display(),
                e
            ))
        })?;

        Ok(Box::new(LocalUploadSink {
            key: key.to_string(),
            final_path,
            partial_path,
            content_type_path,
            content_type: content_type.to_string(),
            file: Some(file),
            written: 0,
        }))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.key_to_path(key)?;
        let start = std::time::Instant::now();

        match fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                return Err(StorageError::DeleteFailed(format!(
                    "Failed to delete file {}: {}",
                    path.display(),
                    e
                )));
            }
        }

        let content_type_path = self.content_type_path(key)?;
        match fs::remove_file(&content_type_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    path = %content_type_path.display(),
                    "Failed to remove content type record"
                );
            }
        }

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage delete successful"
        );

        Ok(())
    }

    async fn content_type(&self, key: &str) -> StorageResult<Option<String>> {
        if !self.exists(key).await? {
            return Err(StorageError::NotFound(key.to_string()));
        }
        match fs::read_to_string(self.content_type_path(key)?).await {
            Ok(content_type) => Ok(Some(content_type)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::BackendError(e.to_string())),
        }
    }
}

/// Writes to a hidden `.partial` sibling and renames it into place on commit.
struct LocalUploadSink {
    key: String,
    final_path: PathBuf,
    partial_path: PathBuf,
    content_type_path: PathBuf,
    content_type: String,
    file: Option<fs::File>,
    written: u64,
}

impl LocalUploadSink {
    fn file(&mut self) -> StorageResult<&mut fs::File> {
        self.file
            .as_mut()
            .ok_or_else(|| StorageError::UploadFailed(format!("Upload of {} is closed", self.key)))
    }
}

#[async_trait]
impl UploadSink for LocalUploadSink {
    async fn write_chunk(&mut self, chunk: Bytes) -> StorageResult<()> {
        let file = self.file()?;
        file.write_all(&chunk)
            .await
            .map_err(|e| StorageError::UploadFailed(format!("Failed to write chunk: {}", e)))?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    async fn commit(&mut self) -> StorageResult<u64> {
        let file = self.file()?;
        file.flush().await?;
        file.sync_all().await.map_err(|e| {
            StorageError::UploadFailed(format!(
                "Failed to sync file {}: {}",
                self.partial_path.display(),
                e
            ))
        })?;
        self.file = None;

        if let Some(parent) = self.content_type_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&self.content_type_path, self.content_type.as_bytes())
            .await
            .map_err(|e| {
                StorageError::UploadFailed(format!(
                    "Failed to record content type of {}: {}",
                    self.key, e
                ))
            })?;

        fs::rename(&self.partial_path, &self.final_path)
            .await
            .map_err(|e| {
                StorageError::UploadFailed(format!(
                    "Failed to move {} into place: {}",
                    self.final_path.display(),
                    e
                ))
            })?;

        tracing::debug!(
            key = %self.key,
            size_bytes = self.written,
            "Local upload committed"
        );

        Ok(self.written)
    }

    async fn abort(&mut self) -> StorageResult<()> {
        self.file = None;
        match fs::remove_file(&self.partial_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::DeleteFailed(format!(
                "Failed to remove {}: {}",
                self.partial_path.display(),
                e
            ))),
        }
    }
}
