//! Cleanroom Storage Library
//!
//! Bucket-scoped storage abstraction, its local and `object_store` backed
//! implementations, and the chunked transfer manager that moves objects
//! between storage and scoped staging buffers.
//!
//! # Keys
//!
//! Keys are object names exactly as they appear in storage events. They must
//! not contain `..` or start with `/`; every backend rejects such keys with
//! [`StorageError::InvalidKey`].

pub mod factory;
#[cfg(feature = "storage-local")]
pub mod local;
#[cfg(feature = "storage-object")]
pub mod object;
pub mod traits;
pub mod transfer;

// Re-export commonly used types
pub use cleanroom_core::StorageBackend;
pub use factory::{create_storage_provider, BucketRegistry};
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
#[cfg(feature = "storage-object")]
pub use object::ObjectStorage;
pub use traits::{Storage, StorageError, StorageProvider, StorageResult, UploadSink};
pub use transfer::{
    RetryPolicy, SpooledFile, StagedContent, StagingTarget, TransferError, TransferManager,
    TransferSession,
};
