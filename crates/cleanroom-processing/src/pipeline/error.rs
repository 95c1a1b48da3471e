use super::state::InvalidTransition;
use crate::traits::SanitizeError;
use crate::validator::AdmissionRejection;
use cleanroom_core::{ErrorMetadata, LogLevel};
use cleanroom_storage::{StorageError, TransferError};
use thiserror::Error;

/// Everything that can end processing of one object early.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Rejected: {0}")]
    Rejected(#[from] AdmissionRejection),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error(transparent)]
    Sanitize(#[from] SanitizeError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
}

impl PipelineError {
    pub fn is_rejection(&self) -> bool {
        matches!(self, PipelineError::Rejected(_))
    }
}

/// (error_code, is_recoverable, log_level)
fn pipeline_error_static_metadata(err: &PipelineError) -> (&'static str, bool, LogLevel) {
    match err {
        PipelineError::Rejected(AdmissionRejection::TooLarge { .. }) => {
            ("FILE_TOO_LARGE", false, LogLevel::Debug)
        }
        PipelineError::Rejected(AdmissionRejection::UnsupportedType { .. }) => {
            ("UNSUPPORTED_CONTENT_TYPE", false, LogLevel::Debug)
        }
        PipelineError::Transfer(TransferError::SourceMissing { .. }) => {
            ("SOURCE_MISSING", false, LogLevel::Warn)
        }
        PipelineError::Transfer(e) => ("TRANSFER_FAILED", e.is_transient(), LogLevel::Error),
        PipelineError::Sanitize(e) => match e {
            SanitizeError::PdfParse(_) => ("PDF_UNREADABLE", false, LogLevel::Warn),
            SanitizeError::NoCopyablePages => ("PDF_NO_COPYABLE_PAGES", false, LogLevel::Warn),
            SanitizeError::Decode(_) => ("IMAGE_UNREADABLE", false, LogLevel::Warn),
            SanitizeError::TooManyPixels { .. } => ("IMAGE_TOO_LARGE", false, LogLevel::Warn),
            SanitizeError::PdfWrite(_) | SanitizeError::Encode(_) => {
                ("REWRITE_FAILED", false, LogLevel::Error)
            }
            SanitizeError::Unsupported(_) => ("UNSUPPORTED_CONTENT_TYPE", false, LogLevel::Warn),
            SanitizeError::Io(_) | SanitizeError::Task(_) => {
                ("SANITIZER_FAILED", true, LogLevel::Error)
            }
        },
        PipelineError::Storage(e) => ("STORAGE_ERROR", e.is_transient(), LogLevel::Error),
        PipelineError::InvalidTransition(_) => ("INTERNAL_ERROR", false, LogLevel::Error),
    }
}

impl ErrorMetadata for PipelineError {
    fn error_code(&self) -> &'static str {
        pipeline_error_static_metadata(self).0
    }

    fn is_recoverable(&self) -> bool {
        pipeline_error_static_metadata(self).1
    }

    fn log_level(&self) -> LogLevel {
        pipeline_error_static_metadata(self).2
    }

    fn client_message(&self) -> String {
        match self {
            PipelineError::Rejected(e) => e.to_string(),
            PipelineError::Transfer(TransferError::SourceMissing { .. }) => {
                "Source object no longer exists".to_string()
            }
            PipelineError::Transfer(_) => "Failed to transfer object".to_string(),
            PipelineError::Sanitize(SanitizeError::Io(_) | SanitizeError::Task(_)) => {
                "Sanitizer failed".to_string()
            }
            PipelineError::Sanitize(e) => e.to_string(),
            PipelineError::Storage(_) => "Failed to access storage".to_string(),
            PipelineError::InvalidTransition(_) => "Internal error".to_string(),
        }
    }
}
