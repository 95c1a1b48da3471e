use crate::datastore::DatastoreStatusStore;
use crate::firestore::FirestoreStatusStore;
use crate::traits::{StatusResult, StatusStore};
use cleanroom_core::{StatusBackend, StatusStoreConfig};
use std::sync::Arc;

/// Create the configured status store.
pub fn create_status_store(config: &StatusStoreConfig) -> StatusResult<Arc<dyn StatusStore>> {
    let endpoint = config.endpoint.as_deref();
    let token = config.access_token.clone();

    let store: Arc<dyn StatusStore> = match config.backend {
        StatusBackend::Datastore => Arc::new(DatastoreStatusStore::new(
            config.project_id.clone(),
            config.name.clone(),
            endpoint,
            token,
        )?),
        StatusBackend::Firestore => Arc::new(FirestoreStatusStore::new(
            config.project_id.clone(),
            config.name.clone(),
            endpoint,
            token,
        )?),
    };

    tracing::info!(
        store = %store.describe(),
        project_id = %config.project_id,
        "Status store ready"
    );

    Ok(store)
}
