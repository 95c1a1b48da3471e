//! Chunked transfers between buckets and local staging buffers.
//!
//! A download pulls an object range by range into [`StagedContent`]; an upload
//! pushes staged content through an [`UploadSink`](crate::UploadSink) in the
//! same chunk sizes. Both are driven by a [`TransferSession`].

mod manager;
mod session;
mod staging;

pub use manager::{RetryPolicy, TransferError, TransferManager};
pub use session::{
    chunk_size_for, SessionError, SessionState, TransferSession, LARGE_CHUNK_SIZE,
    LARGE_OBJECT_THRESHOLD, SMALL_CHUNK_SIZE,
};
pub use staging::{SpooledFile, StagedContent, StagingTarget};
