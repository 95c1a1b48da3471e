#[cfg(feature = "storage-local")]
use crate::LocalStorage;
#[cfg(feature = "storage-object")]
use crate::ObjectStorage;
use crate::{Storage, StorageBackend, StorageError, StorageProvider, StorageResult};
use cleanroom_core::Config;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Backend settings needed to open any bucket.
#[derive(Debug, Clone)]
enum BackendSettings {
    Gcs,
    S3 {
        region: String,
        endpoint: Option<String>,
    },
    Local {
        root: PathBuf,
    },
    Memory,
}

/// Opens bucket handles on demand and keeps one handle per bucket name.
///
/// The memory backend relies on the cache: every lookup of a bucket name must
/// see the same in-memory store.
pub struct BucketRegistry {
    settings: BackendSettings,
    buckets: Mutex<HashMap<String, Arc<dyn Storage>>>,
}

impl BucketRegistry {
    pub fn memory() -> Self {
        Self::with_settings(BackendSettings::Memory)
    }

    pub fn local(root: impl Into<PathBuf>) -> Self {
        Self::with_settings(BackendSettings::Local { root: root.into() })
    }

    fn with_settings(settings: BackendSettings) -> Self {
        Self {
            settings,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    fn open(&self, name: &str) -> StorageResult<Arc<dyn Storage>> {
        match &self.settings {
            #[cfg(feature = "storage-object")]
            BackendSettings::Gcs => Ok(Arc::new(ObjectStorage::gcs(name)?)),

            #[cfg(feature = "storage-object")]
            BackendSettings::S3 { region, endpoint } => Ok(Arc::new(ObjectStorage::s3(
                name,
                region.clone(),
                endpoint.clone(),
            )?)),

            #[cfg(feature = "storage-object")]
            BackendSettings::Memory => Ok(Arc::new(ObjectStorage::in_memory(name))),

            #[cfg(not(feature = "storage-object"))]
            BackendSettings::Gcs | BackendSettings::S3 { .. } | BackendSettings::Memory => {
                Err(StorageError::ConfigError(
                    "Object storage backends not available (storage-object feature not enabled)"
                        .to_string(),
                ))
            }

            #[cfg(feature = "storage-local")]
            BackendSettings::Local { root } => Ok(Arc::new(LocalStorage::new(root, name)?)),

            #[cfg(not(feature = "storage-local"))]
            BackendSettings::Local { .. } => Err(StorageError::ConfigError(
                "Local storage backend not available (storage-local feature not enabled)"
                    .to_string(),
            )),
        }
    }
}

impl StorageProvider for BucketRegistry {
    fn bucket(&self, name: &str) -> StorageResult<Arc<dyn Storage>> {
        let mut buckets = self
            .buckets
            .lock()
            .map_err(|_| StorageError::BackendError("Bucket registry lock poisoned".to_string()))?;

        if let Some(storage) = buckets.get(name) {
            return Ok(Arc::clone(storage));
        }

        let storage = self.open(name)?;
        tracing::debug!(bucket = %name, backend = %self.backend_type(), "Opened bucket");
        buckets.insert(name.to_string(), Arc::clone(&storage));
        Ok(storage)
    }

    fn backend_type(&self) -> StorageBackend {
        match self.settings {
            BackendSettings::Gcs => StorageBackend::Gcs,
            BackendSettings::S3 { .. } => StorageBackend::S3,
            BackendSettings::Local { .. } => StorageBackend::Local,
            BackendSettings::Memory => StorageBackend::Memory,
        }
    }
}

/// Create a storage provider based on configuration
pub fn create_storage_provider(config: &Config) -> StorageResult<Arc<dyn StorageProvider>> {
    let settings = match config.storage_backend {
        StorageBackend::Gcs => BackendSettings::Gcs,
        StorageBackend::S3 => {
            let region = config.s3_region.clone().ok_or_else(|| {
                StorageError::ConfigError("S3_REGION or AWS_REGION not configured".to_string())
            })?;
            BackendSettings::S3 {
                region,
                endpoint: config.s3_endpoint.clone(),
            }
        }
        StorageBackend::Local => {
            let root = config.local_storage_path.as_ref().map(PathBuf::from).ok_or_else(|| {
                StorageError::ConfigError("LOCAL_STORAGE_PATH not configured".to_string())
            })?;
            BackendSettings::Local { root }
        }
        StorageBackend::Memory => BackendSettings::Memory,
    };

    let registry = BucketRegistry::with_settings(settings);

    // Open the target bucket eagerly so bad credentials or paths fail at startup.
    registry.bucket(&config.target_bucket)?;

    tracing::info!(
        backend = %config.storage_backend,
        target_bucket = %config.target_bucket,
        "Storage provider ready"
    );

    Ok(Arc::new(registry))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[tokio::test]
    async fn test_memory_registry_shares_buckets() {
        let registry = BucketRegistry::memory();
        let first = registry.bucket("uploads").unwrap();
        first
            .put_bytes("a.pdf", "application/pdf", Bytes::from_static(b"%PDF"))
            .await
            .unwrap();

        let again = registry.bucket("uploads").unwrap();
        assert!(again.exists("a.pdf").await.unwrap());

        let other = registry.bucket("clean").unwrap();
        assert!(!other.exists("a.pdf").await.unwrap());
        assert_eq!(registry.backend_type(), StorageBackend::Memory);
    }

    #[cfg(feature = "storage-local")]
    #[tokio::test]
    async fn test_local_registry_uses_bucket_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let registry = BucketRegistry::local(dir.path());
        let storage = registry.bucket("clean").unwrap();
        storage
            .put_bytes("x.png", "image/png", Bytes::from_static(b"png"))
            .await
            .unwrap();
        assert!(dir.path().join("clean/x.png").exists());
    }

    #[test]
    fn test_create_from_config() {
        let mut config = Config::from_lookup(|key| match key {
            "TARGET_BUCKET_NAME" => Some("clean".to_string()),
            "STORAGE_BACKEND" => Some("memory".to_string()),
            _ => None,
        })
        .unwrap();

        let provider = create_storage_provider(&config).unwrap();
        assert_eq!(provider.backend_type(), StorageBackend::Memory);
        assert_eq!(provider.bucket("clean").unwrap().bucket(), "clean");

        config.storage_backend = StorageBackend::S3;
        config.s3_region = None;
        assert!(matches!(
            create_storage_provider(&config),
            Err(StorageError::ConfigError(_))
        ));
    }
}
