//! Cleanroom Core Library
//!
//! This crate provides the domain models, error metadata, content kinds and
//! configuration shared by every cleanroom component.

pub mod config;
pub mod content;
pub mod error;
pub mod models;
pub mod storage_types;

// Re-export commonly used types
pub use config::{Config, ConfigError, StatusStoreConfig, TransferRetryConfig};
pub use content::ContentKind;
pub use error::{ErrorMetadata, LogLevel};
pub use models::{ObjectDescriptor, ProcessingStatus, StatusBackend, TriggerEvent};
pub use storage_types::StorageBackend;
