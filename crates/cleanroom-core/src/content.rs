//! Supported content kinds

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};

/// A content type the pipeline knows how to sanitize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Pdf,
    Jpeg,
    Png,
}

impl ContentKind {
    pub const ALL: [ContentKind; 3] = [ContentKind::Pdf, ContentKind::Jpeg, ContentKind::Png];

    /// Resolve a MIME type (parameters and case ignored) to a supported kind.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_lowercase();

        match essence.as_str() {
            "application/pdf" => Some(ContentKind::Pdf),
            "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(ContentKind::Jpeg),
            "image/png" => Some(ContentKind::Png),
            _ => None,
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ContentKind::Pdf => "application/pdf",
            ContentKind::Jpeg => "image/jpeg",
            ContentKind::Png => "image/png",
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self, ContentKind::Jpeg | ContentKind::Png)
    }
}

impl Display for ContentKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ContentKind::Pdf => write!(f, "pdf"),
            ContentKind::Jpeg => write!(f, "jpeg"),
            ContentKind::Png => write!(f, "png"),
        }
    }
}
