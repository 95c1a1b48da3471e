//! Cleanroom Status Library
//!
//! Records the processing outcome of an object in an external store. Records
//! are keyed by object name, owned by another system, and never created here:
//! an update against a missing record reports `false` and writes nothing.

mod client;
pub mod datastore;
pub mod factory;
pub mod firestore;
pub mod traits;

pub use datastore::DatastoreStatusStore;
pub use factory::create_status_store;
pub use firestore::FirestoreStatusStore;
pub use traits::{format_timestamp, StatusError, StatusResult, StatusStore, StatusUpdate};
