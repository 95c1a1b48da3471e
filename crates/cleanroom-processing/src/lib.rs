//! Cleanroom Processing Library
//!
//! Content sanitizers for PDF, JPEG and PNG, the admission policy applied to
//! trigger events, and the pipeline that moves one object from its source
//! bucket through a sanitizer into the target bucket.
//!
//! # Features
//!
//! - `image`: JPEG and PNG sanitizers
//! - `document`: PDF sanitizer

pub mod pipeline;
pub mod sanitize;
pub mod traits;
pub mod validator;

// Re-export commonly used types
pub use pipeline::{
    InvalidTransition, PipelineError, PipelineReport, PipelineState, SanitizationPipeline,
};
pub use sanitize::{DecodeLimits, SanitizerRegistry};
pub use traits::{ContentSanitizer, SanitizeError, SanitizeOutcome};
pub use validator::{AdmissionPolicy, AdmissionRejection};

#[cfg(feature = "image")]
pub use sanitize::jpeg::JpegSanitizer;
#[cfg(feature = "document")]
pub use sanitize::pdf::PdfSanitizer;
#[cfg(feature = "image")]
pub use sanitize::png::PngSanitizer;
