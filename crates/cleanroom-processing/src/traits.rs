//! Core traits for content sanitization

use bytes::Bytes;
use cleanroom_core::ContentKind;
use cleanroom_storage::StagedContent;
use thiserror::Error;

/// Sanitization errors. Each one is fatal for the object being processed.
#[derive(Debug, Error)]
pub enum SanitizeError {
    #[error("Unreadable PDF: {0}")]
    PdfParse(String),

    #[error("No page of the PDF could be copied")]
    NoCopyablePages,

    #[error("Failed to write sanitized PDF: {0}")]
    PdfWrite(String),

    #[error("Image decode failed: {0}")]
    Decode(String),

    #[error("Image encode failed: {0}")]
    Encode(String),

    #[error("Image is {width}x{height}, above the limit of {max_pixels} pixels")]
    TooManyPixels {
        width: u32,
        height: u32,
        max_pixels: u64,
    },

    #[error("No sanitizer registered for {0}")]
    Unsupported(ContentKind),

    #[error("Staged content unreadable: {0}")]
    Io(#[from] std::io::Error),

    #[error("Sanitizer task failed: {0}")]
    Task(String),
}

/// Result of a successful sanitization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SanitizeOutcome {
    /// Nothing to remove; the original bytes go to the destination.
    Unchanged,
    /// Freshly built content replacing the original.
    Rewritten(Bytes),
}

impl SanitizeOutcome {
    pub fn is_rewritten(&self) -> bool {
        matches!(self, SanitizeOutcome::Rewritten(_))
    }
}

/// Format-specific content rewriting.
///
/// Implementations are synchronous and CPU-bound; callers run them on the
/// blocking pool.
pub trait ContentSanitizer: Send + Sync {
    fn kind(&self) -> ContentKind;

    fn sanitize(&self, content: &StagedContent) -> Result<SanitizeOutcome, SanitizeError>;
}
