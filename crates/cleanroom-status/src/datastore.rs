use crate::client::{check_status, RestClient};
use crate::traits::{StatusError, StatusResult, StatusStore, StatusUpdate};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};

pub const DEFAULT_DATASTORE_ENDPOINT: &str = "https://datastore.googleapis.com";

/// Status records stored as Datastore entities of one kind, keyed by object name.
pub struct DatastoreStatusStore {
    client: RestClient,
    project_id: String,
    kind: String,
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    found: Vec<EntityResult>,
}

#[derive(Debug, Deserialize)]
struct EntityResult {
    entity: Value,
    #[serde(default)]
    version: Option<String>,
}

impl DatastoreStatusStore {
    pub fn new(
        project_id: impl Into<String>,
        kind: impl Into<String>,
        endpoint: Option<&str>,
        access_token: Option<String>,
    ) -> StatusResult<Self> {
        let client = RestClient::new(
            endpoint.unwrap_or(DEFAULT_DATASTORE_ENDPOINT),
            access_token,
        )?;

        Ok(Self {
            client,
            project_id: project_id.into(),
            kind: kind.into(),
        })
    }

    fn key(&self, object_id: &str) -> Value {
        json!({
            "partitionId": { "projectId": self.project_id },
            "path": [{ "kind": self.kind, "name": object_id }]
        })
    }

    async fn lookup(&self, object_id: &str) -> StatusResult<Option<EntityResult>> {
        let response = self
            .client
            .post(&format!("/v1/projects/{}:lookup", self.project_id))
            .json(&json!({ "keys": [self.key(object_id)] }))
            .send()
            .await?;

        let lookup: LookupResponse = check_status(response).await?.json().await?;
        Ok(lookup.found.into_iter().next())
    }

    async fn commit(&self, entity: Value, base_version: Option<String>) -> StatusResult<()> {
        let mut mutation = Map::new();
        mutation.insert("update".to_string(), entity);
        // Fails the commit if the entity changed since the lookup.
        if let Some(version) = base_version {
            mutation.insert("baseVersion".to_string(), Value::String(version));
        }

        let response = self
            .client
            .post(&format!("/v1/projects/{}:commit", self.project_id))
            .json(&json!({
                "mode": "NON_TRANSACTIONAL",
                "mutations": [Value::Object(mutation)]
            }))
            .send()
            .await?;

        check_status(response).await?;
        Ok(())
    }
}

fn apply_update(mut entity: Value, update: &StatusUpdate) -> StatusResult<Value> {
    let object = entity
        .as_object_mut()
        .ok_or_else(|| StatusError::InvalidResponse("entity is not an object".to_string()))?;

    let properties = object
        .entry("properties")
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
        .ok_or_else(|| StatusError::InvalidResponse("entity properties is not an object".to_string()))?;

    properties.insert(
        "status".to_string(),
        json!({ "stringValue": update.status.as_str() }),
    );
    properties.insert(
        "updated_at".to_string(),
        json!({ "stringValue": update.timestamp() }),
    );
    if let Some(url) = &update.url {
        properties.insert("url".to_string(), json!({ "stringValue": url }));
    }

    Ok(entity)
}

#[async_trait]
impl StatusStore for DatastoreStatusStore {
    async fn update_status(&self, object_id: &str, update: &StatusUpdate) -> StatusResult<bool> {
        let found = match self.lookup(object_id).await? {
            Some(found) => found,
            None => return Ok(false),
        };

        let entity = apply_update(found.entity, update)?;
        self.commit(entity, found.version).await?;

        tracing::debug!(
            kind = %self.kind,
            object_id = %object_id,
            status = %update.status,
            "Datastore entity updated"
        );
        Ok(true)
    }

    fn describe(&self) -> String {
        format!("datastore/{}", self.kind)
    }
}
