use cleanroom_core::{Config, ContentKind, ObjectDescriptor};

/// Reasons an object is turned away before any I/O.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdmissionRejection {
    #[error("File too large: {size} bytes (max: {max} bytes)")]
    TooLarge { size: u64, max: u64 },

    #[error("Unsupported content type: {content_type:?} (allowed: {allowed:?})")]
    UnsupportedType {
        content_type: String,
        allowed: Vec<&'static str>,
    },
}

/// Size and content-type gate applied to every trigger event.
///
/// Works only on the declared descriptor; nothing is read from storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionPolicy {
    max_file_size: u64,
}

impl AdmissionPolicy {
    pub fn new(max_file_size: u64) -> Self {
        Self { max_file_size }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.max_file_size)
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    pub fn validate_size(&self, size: u64) -> Result<(), AdmissionRejection> {
        if size > self.max_file_size {
            return Err(AdmissionRejection::TooLarge {
                size,
                max: self.max_file_size,
            });
        }
        Ok(())
    }

    pub fn validate_content_type(&self, content_type: &str) -> Result<ContentKind, AdmissionRejection> {
        ContentKind::from_content_type(content_type).ok_or_else(|| {
            AdmissionRejection::UnsupportedType {
                content_type: content_type.to_string(),
                allowed: ContentKind::ALL.iter().map(|k| k.mime_type()).collect(),
            }
        })
    }

    /// Size first, then type. Returns the kind that selects the sanitizer.
    pub fn admit(&self, object: &ObjectDescriptor) -> Result<ContentKind, AdmissionRejection> {
        self.validate_size(object.size)?;
        self.validate_content_type(&object.content_type)
    }
}
