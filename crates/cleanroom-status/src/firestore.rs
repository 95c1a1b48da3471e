use crate::client::{check_status, is_not_found, RestClient};
use crate::traits::{StatusResult, StatusStore, StatusUpdate};
use async_trait::async_trait;
use serde_json::{json, Map, Value};

pub const DEFAULT_FIRESTORE_ENDPOINT: &str = "https://firestore.googleapis.com";

/// Status records stored as documents in one Firestore collection, with the
/// object name as document id.
pub struct FirestoreStatusStore {
    client: RestClient,
    project_id: String,
    collection: String,
}

impl FirestoreStatusStore {
    pub fn new(
        project_id: impl Into<String>,
        collection: impl Into<String>,
        endpoint: Option<&str>,
        access_token: Option<String>,
    ) -> StatusResult<Self> {
        let client = RestClient::new(
            endpoint.unwrap_or(DEFAULT_FIRESTORE_ENDPOINT),
            access_token,
        )?;

        Ok(Self {
            client,
            project_id: project_id.into(),
            collection: collection.into(),
        })
    }

    /// The object id is percent-encoded as a single path segment, so `/` in an
    /// object name becomes `%2F` and never addresses a subcollection.
    fn document_path(&self, object_id: &str) -> String {
        format!(
            "/v1/projects/{}/databases/(default)/documents/{}/{}",
            self.project_id,
            self.collection,
            urlencoding::encode(object_id)
        )
    }
}

#[async_trait]
impl StatusStore for FirestoreStatusStore {
    async fn update_status(&self, object_id: &str, update: &StatusUpdate) -> StatusResult<bool> {
        let path = self.document_path(object_id);

        let response = self.client.get(&path).send().await?;
        if is_not_found(&response) {
            return Ok(false);
        }
        check_status(response).await?;

        let mut fields = Map::new();
        let mut mask = vec![("updateMask.fieldPaths", "status"), ("updateMask.fieldPaths", "updated_at")];
        fields.insert(
            "status".to_string(),
            json!({ "stringValue": update.status.as_str() }),
        );
        fields.insert(
            "updated_at".to_string(),
            json!({ "stringValue": update.timestamp() }),
        );
        if let Some(url) = &update.url {
            fields.insert("url".to_string(), json!({ "stringValue": url }));
            mask.push(("updateMask.fieldPaths", "url"));
        }
        // Never create the document if it disappeared after the read.
        mask.push(("currentDocument.exists", "true"));

        let response = self
            .client
            .patch(&path)
            .query(&mask)
            .json(&json!({ "fields": Value::Object(fields) }))
            .send()
            .await?;

        if is_not_found(&response) {
            return Ok(false);
        }
        check_status(response).await?;

        tracing::debug!(
            collection = %self.collection,
            object_id = %object_id,
            status = %update.status,
            "Firestore document updated"
        );
        Ok(true)
    }

    fn describe(&self) -> String {
        format!("firestore/{}", self.collection)
    }
}
