//! Configuration module
//!
//! Configuration is read from environment-style variables. `Config::from_env`
//! reads the process environment; `Config::from_lookup` takes any key lookup so
//! parsing can be exercised without mutating the environment.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::models::StatusBackend;
use crate::storage_types::StorageBackend;

// Defaults
const MAX_FILE_SIZE: u64 = 268_435_456; // 256MB
const TRANSFER_MAX_RETRIES: u32 = 2;
const TRANSFER_RETRY_BASE_DELAY_MS: u64 = 200;
const PUBLIC_URL_BASE: &str = "https://storage.googleapis.com";

/// Configuration errors are fatal: no object is processed with a bad config.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Status store selection. Present only when both the backend type and the
/// record collection name are configured.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusStoreConfig {
    pub backend: StatusBackend,
    /// Datastore kind or Firestore collection holding the status records
    pub name: String,
    pub project_id: String,
    /// Base URL override, used for emulators
    pub endpoint: Option<String>,
    /// Static bearer token passed through as-is
    pub access_token: Option<String>,
}

/// Bounded retry for idempotent download chunk reads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransferRetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
}

impl Default for TransferRetryConfig {
    fn default() -> Self {
        Self {
            max_retries: TRANSFER_MAX_RETRIES,
            base_delay_ms: TRANSFER_RETRY_BASE_DELAY_MS,
        }
    }
}

/// Pipeline configuration
#[derive(Clone, Debug)]
pub struct Config {
    pub environment: String,
    pub target_bucket: String,
    pub max_file_size: u64,
    // Storage configuration
    pub storage_backend: StorageBackend,
    pub s3_region: Option<String>,
    pub s3_endpoint: Option<String>, // Custom endpoint for S3-compatible providers (MinIO etc.)
    pub local_storage_path: Option<String>,
    // Status tracking
    pub status_store: Option<StatusStoreConfig>,
    pub public_url_base: String,
    // Pipeline behaviour
    pub delete_source: bool,
    pub report_rejections: bool,
    pub transfer_retry: TransferRetryConfig,
    pub spool_dir: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Empty values count as unset, as they do for the deployment tooling.
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let target_bucket = get("TARGET_BUCKET_NAME").ok_or(ConfigError::Missing("TARGET_BUCKET_NAME"))?;

        let storage_backend = match get("STORAGE_BACKEND") {
            Some(value) => value.parse::<StorageBackend>().map_err(|e| ConfigError::Invalid {
                key: "STORAGE_BACKEND",
                reason: e.to_string(),
            })?,
            None => StorageBackend::Gcs,
        };

        let status_store = Self::status_store_from(&get)?;

        let config = Config {
            environment: get("ENVIRONMENT")
                .or_else(|| get("APP_ENV"))
                .unwrap_or_else(|| "development".to_string()),
            target_bucket,
            max_file_size: parse_or(&get, "MAX_FILE_SIZE", MAX_FILE_SIZE)?,
            storage_backend,
            s3_region: get("S3_REGION").or_else(|| get("AWS_REGION")),
            s3_endpoint: get("S3_ENDPOINT"),
            local_storage_path: get("LOCAL_STORAGE_PATH"),
            status_store,
            public_url_base: get("PUBLIC_URL_BASE")
                .map(|s| s.trim_end_matches('/').to_string())
                .unwrap_or_else(|| PUBLIC_URL_BASE.to_string()),
            delete_source: parse_or(&get, "DELETE_SOURCE_AFTER_SANITIZE", false)?,
            report_rejections: parse_or(&get, "REPORT_REJECTIONS", true)?,
            transfer_retry: TransferRetryConfig {
                max_retries: parse_or(&get, "TRANSFER_MAX_RETRIES", TRANSFER_MAX_RETRIES)?,
                base_delay_ms: parse_or(
                    &get,
                    "TRANSFER_RETRY_BASE_DELAY_MS",
                    TRANSFER_RETRY_BASE_DELAY_MS,
                )?,
            },
            spool_dir: get("SPOOL_DIR").map(PathBuf::from),
        };

        config.validate()?;
        Ok(config)
    }

    fn status_store_from<G>(get: &G) -> Result<Option<StatusStoreConfig>, ConfigError>
    where
        G: Fn(&str) -> Option<String>,
    {
        let backend = get("FILE_DATABASE_TYPE");
        let name = get("FILE_DATABASE_NAME");

        let (backend, name) = match (backend, name) {
            (None, None) => return Ok(None),
            (Some(backend), Some(name)) => (backend, name),
            (Some(_), None) => return Err(ConfigError::Missing("FILE_DATABASE_NAME")),
            (None, Some(_)) => return Err(ConfigError::Missing("FILE_DATABASE_TYPE")),
        };

        let backend = backend
            .parse::<StatusBackend>()
            .map_err(|e| ConfigError::Invalid {
                key: "FILE_DATABASE_TYPE",
                reason: e.to_string(),
            })?;

        let project_id = get("GOOGLE_CLOUD_PROJECT")
            .or_else(|| get("GCP_PROJECT"))
            .ok_or(ConfigError::Missing("GOOGLE_CLOUD_PROJECT"))?;

        Ok(Some(StatusStoreConfig {
            backend,
            name,
            project_id,
            endpoint: get("STATUS_STORE_ENDPOINT").map(|s| s.trim_end_matches('/').to_string()),
            access_token: get("STATUS_STORE_ACCESS_TOKEN"),
        }))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_file_size == 0 {
            return Err(ConfigError::Invalid {
                key: "MAX_FILE_SIZE",
                reason: "must be greater than zero".to_string(),
            });
        }

        // Validate storage backend configuration
        match self.storage_backend {
            StorageBackend::S3 => {
                if self.s3_region.is_none() {
                    return Err(ConfigError::Missing("S3_REGION or AWS_REGION"));
                }
            }
            StorageBackend::Local => {
                if self.local_storage_path.is_none() {
                    return Err(ConfigError::Missing("LOCAL_STORAGE_PATH"));
                }
            }
            StorageBackend::Gcs | StorageBackend::Memory => {}
        }

        Ok(())
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let env = self.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    pub fn status_tracking_enabled(&self) -> bool {
        self.status_store.is_some()
    }

    /// Public URL of an object in the target bucket, written to status records.
    pub fn public_url(&self, object_name: &str) -> String {
        format!(
            "{}/{}/{}",
            self.public_url_base, self.target_bucket, object_name
        )
    }
}

fn parse_or<G, T>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    G: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .to_lowercase()
            .parse::<T>()
            .map_err(|e| ConfigError::Invalid {
                key,
                reason: format!("{} ({})", raw, e),
            }),
        None => Ok(default),
    }
}
