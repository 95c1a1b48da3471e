use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cleanroom_core::ProcessingStatus;
use thiserror::Error;

/// Status store errors. None of these change the outcome of an object.
#[derive(Debug, Error)]
pub enum StatusError {
    #[error("Status store request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Status store returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Unexpected status store response: {0}")]
    InvalidResponse(String),

    #[error("Status store configuration error: {0}")]
    Config(String),
}

pub type StatusResult<T> = Result<T, StatusError>;

/// Fields written to an existing status record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub status: ProcessingStatus,
    /// Public URL of the sanitized object; left untouched when `None`.
    pub url: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl StatusUpdate {
    pub fn processed(url: impl Into<String>) -> Self {
        Self {
            status: ProcessingStatus::Processed,
            url: Some(url.into()),
            updated_at: Utc::now(),
        }
    }

    pub fn failed() -> Self {
        Self {
            status: ProcessingStatus::Failed,
            url: None,
            updated_at: Utc::now(),
        }
    }

    pub fn timestamp(&self) -> String {
        format_timestamp(&self.updated_at)
    }
}

/// `YYYY-MM-DDTHH:MM:SS.ffffffZ` in UTC.
pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

/// External store holding one status record per object.
///
/// Records are created by someone else; the store only updates them.
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Update the record keyed by `object_id`.
    ///
    /// Returns `false` without writing anything when no record exists.
    async fn update_status(&self, object_id: &str, update: &StatusUpdate) -> StatusResult<bool>;

    /// Short description for logs, e.g. `datastore/uploads`.
    fn describe(&self) -> String;
}
