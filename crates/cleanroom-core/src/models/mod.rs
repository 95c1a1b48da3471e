//! Data models shared by the pipeline, storage and status crates.

mod object;
mod status;

pub use object::{ObjectDescriptor, TriggerEvent};
pub use status::{ProcessingStatus, StatusBackend};
