//! Format-specific sanitizers and the registry that selects them.

#[cfg(feature = "image")]
pub mod jpeg;
#[cfg(feature = "document")]
pub mod pdf;
#[cfg(feature = "image")]
pub mod png;

use crate::traits::{ContentSanitizer, SanitizeError, SanitizeOutcome};
use cleanroom_core::ContentKind;
use cleanroom_storage::StagedContent;
use std::collections::HashMap;
use std::sync::Arc;

/// Upper bounds applied while decoding images.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeLimits {
    /// Maximum `width * height`.
    pub max_pixels: u64,
}

impl DecodeLimits {
    /// Widest sample layout the decoders produce (16-bit RGBA).
    const MAX_BYTES_PER_PIXEL: u64 = 8;

    /// The pixel budget equals the configured maximum file size.
    pub fn from_max_file_size(max_file_size: u64) -> Self {
        Self {
            max_pixels: max_file_size,
        }
    }

    pub fn check_dimensions(&self, width: u32, height: u32) -> Result<(), SanitizeError> {
        let pixels = u64::from(width) * u64::from(height);
        if pixels > self.max_pixels {
            return Err(SanitizeError::TooManyPixels {
                width,
                height,
                max_pixels: self.max_pixels,
            });
        }
        Ok(())
    }

    /// Allocation ceiling for a decoded frame.
    pub fn max_alloc_bytes(&self) -> u64 {
        self.max_pixels.saturating_mul(Self::MAX_BYTES_PER_PIXEL)
    }
}

/// Sanitizers keyed by content kind.
#[derive(Clone, Default)]
pub struct SanitizerRegistry {
    sanitizers: HashMap<ContentKind, Arc<dyn ContentSanitizer>>,
}

impl SanitizerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every sanitizer compiled into this build.
    pub fn with_defaults(limits: DecodeLimits) -> Self {
        let mut registry = Self::new();
        #[cfg(feature = "document")]
        registry.register(Arc::new(pdf::PdfSanitizer::new()));
        #[cfg(feature = "image")]
        {
            registry.register(Arc::new(jpeg::JpegSanitizer::new(limits)));
            registry.register(Arc::new(png::PngSanitizer::new(limits)));
        }
        #[cfg(not(feature = "image"))]
        let _ = limits;
        registry
    }

    /// Register a sanitizer, replacing any previous one for the same kind.
    pub fn register(&mut self, sanitizer: Arc<dyn ContentSanitizer>) {
        self.sanitizers.insert(sanitizer.kind(), sanitizer);
    }

    pub fn get(&self, kind: ContentKind) -> Option<Arc<dyn ContentSanitizer>> {
        self.sanitizers.get(&kind).cloned()
    }

    pub fn supports(&self, kind: ContentKind) -> bool {
        self.sanitizers.contains_key(&kind)
    }

    /// Run the sanitizer for `kind` on the blocking pool.
    ///
    /// The staged content is moved into the blocking task and handed back
    /// with the result so the caller decides when its temp file is dropped.
    pub async fn run(
        &self,
        kind: ContentKind,
        content: StagedContent,
    ) -> (StagedContent, Result<SanitizeOutcome, SanitizeError>) {
        let sanitizer = match self.get(kind) {
            Some(sanitizer) => sanitizer,
            None => return (content, Err(SanitizeError::Unsupported(kind))),
        };

        let task = tokio::task::spawn_blocking(move || {
            let result = sanitizer.sanitize(&content);
            (content, result)
        });

        match task.await {
            Ok(pair) => pair,
            // The staged content was inside the task; a panic drops it there.
            Err(e) => (
                StagedContent::Memory(bytes::Bytes::new()),
                Err(SanitizeError::Task(e.to_string())),
            ),
        }
    }
}
