use super::error::PipelineError;
use super::state::PipelineState;
use crate::sanitize::{DecodeLimits, SanitizerRegistry};
use crate::traits::SanitizeOutcome;
use crate::validator::{AdmissionPolicy, AdmissionRejection};
use cleanroom_core::{log_at_level, Config, ContentKind, ErrorMetadata, ObjectDescriptor};
use cleanroom_status::{StatusStore, StatusUpdate};
use cleanroom_storage::{RetryPolicy, StagedContent, StagingTarget, StorageProvider, TransferManager};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

/// Outcome of processing one object.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub object: String,
    pub source_bucket: String,
    pub target_bucket: String,
    pub content_kind: Option<ContentKind>,
    pub state: PipelineState,
    /// `false` when the original bytes were copied unchanged.
    pub rewritten: bool,
    pub bytes_written: u64,
    pub source_deleted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Whether a status record existed. `None` when tracking is disabled,
    /// skipped, or the store could not be reached.
    pub status_record_found: Option<bool>,
    pub duration_ms: f64,
}

impl PipelineReport {
    fn new(object: &ObjectDescriptor, target_bucket: &str) -> Self {
        Self {
            object: object.name.clone(),
            source_bucket: object.bucket.clone(),
            target_bucket: target_bucket.to_string(),
            content_kind: None,
            state: PipelineState::Admitted,
            rewritten: false,
            bytes_written: 0,
            source_deleted: false,
            error_code: None,
            error: None,
            status_record_found: None,
            duration_ms: 0.0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.state == PipelineState::Completed
    }

    fn advance(&mut self, next: PipelineState) -> Result<(), PipelineError> {
        self.state = self.state.transition(next)?;
        tracing::debug!(object = %self.object, state = %self.state, "Pipeline state changed");
        Ok(())
    }

    /// Move to a terminal state after an error. A transition the table does
    /// not allow is logged and forced so the report is always terminal.
    fn settle(&mut self, next: PipelineState) {
        match self.state.transition(next) {
            Ok(state) => self.state = state,
            Err(e) => {
                tracing::error!(object = %self.object, error = %e, "Forcing terminal state");
                self.state = next;
            }
        }
    }
}

/// Admission, download, sanitize, upload, optional source delete and status
/// update for one object at a time.
///
/// Shared freely between concurrent invocations; it holds only immutable
/// configuration and `Arc` clients.
pub struct SanitizationPipeline {
    config: Arc<Config>,
    admission: AdmissionPolicy,
    storage: Arc<dyn StorageProvider>,
    transfer: TransferManager,
    sanitizers: SanitizerRegistry,
    status: Option<Arc<dyn StatusStore>>,
}

impl SanitizationPipeline {
    pub fn new(
        config: Arc<Config>,
        storage: Arc<dyn StorageProvider>,
        status: Option<Arc<dyn StatusStore>>,
    ) -> Self {
        let transfer = TransferManager::new(
            RetryPolicy::from(config.transfer_retry),
            config.spool_dir.clone(),
        );
        let sanitizers =
            SanitizerRegistry::with_defaults(DecodeLimits::from_max_file_size(config.max_file_size));

        Self {
            admission: AdmissionPolicy::from_config(&config),
            config,
            storage,
            transfer,
            sanitizers,
            status,
        }
    }

    pub fn with_sanitizers(mut self, sanitizers: SanitizerRegistry) -> Self {
        self.sanitizers = sanitizers;
        self
    }

    pub fn with_transfer_manager(mut self, transfer: TransferManager) -> Self {
        self.transfer = transfer;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Process one object end to end. Never fails; errors end up in the report.
    pub async fn process(&self, object: &ObjectDescriptor) -> PipelineReport {
        let start = Instant::now();
        let mut report = PipelineReport::new(object, &self.config.target_bucket);

        tracing::info!(
            bucket = %object.bucket,
            key = %object.name,
            size_bytes = object.size,
            content_type = %object.content_type,
            "Processing object"
        );

        match self.execute(object, &mut report).await {
            Ok(()) => {
                let update = StatusUpdate::processed(self.config.public_url(&object.name));
                report.status_record_found = self.record_status(&object.name, &update).await;
            }
            Err(err) => {
                report.error_code = Some(err.error_code());
                report.error = Some(err.client_message());

                log_at_level!(
                    err.log_level(),
                    bucket = %object.bucket,
                    key = %object.name,
                    state = %report.state,
                    error_code = err.error_code(),
                    recoverable = err.is_recoverable(),
                    error = %err,
                    "Object not sanitized"
                );

                if err.is_rejection() {
                    report.settle(PipelineState::Rejected);
                    if self.config.report_rejections {
                        report.status_record_found =
                            self.record_status(&object.name, &StatusUpdate::failed()).await;
                    }
                } else {
                    report.settle(PipelineState::Failed);
                    report.status_record_found =
                        self.record_status(&object.name, &StatusUpdate::failed()).await;
                }
            }
        }

        report.duration_ms = start.elapsed().as_secs_f64() * 1000.0;

        tracing::info!(
            bucket = %object.bucket,
            key = %object.name,
            state = %report.state,
            rewritten = report.rewritten,
            bytes_written = report.bytes_written,
            duration_ms = report.duration_ms,
            "Object finished"
        );

        report
    }

    async fn execute(
        &self,
        object: &ObjectDescriptor,
        report: &mut PipelineReport,
    ) -> Result<(), PipelineError> {
        let kind = self.admission.admit(object)?;
        report.content_kind = Some(kind);

        if !self.sanitizers.supports(kind) {
            return Err(AdmissionRejection::UnsupportedType {
                content_type: object.content_type.clone(),
                allowed: ContentKind::ALL
                    .iter()
                    .filter(|k| self.sanitizers.supports(**k))
                    .map(|k| k.mime_type())
                    .collect(),
            }
            .into());
        }

        report.advance(PipelineState::Downloading)?;
        let source = self.storage.bucket(&object.bucket)?;
        let target = self.storage.bucket(&self.config.target_bucket)?;

        let staging = if kind.is_image() {
            StagingTarget::Memory
        } else {
            StagingTarget::TempFile
        };
        let staged = self
            .transfer
            .download(source.as_ref(), &object.name, object.size, staging)
            .await?;

        report.advance(PipelineState::Sanitizing)?;
        let (staged, result) = self.sanitizers.run(kind, staged).await;
        let outcome = result?;

        report.advance(PipelineState::Uploading)?;
        let written = match outcome {
            SanitizeOutcome::Unchanged => {
                self.transfer
                    .upload(target.as_ref(), &object.name, &object.content_type, &staged)
                    .await?
            }
            SanitizeOutcome::Rewritten(bytes) => {
                // Release the original (and its temp file) before uploading.
                drop(staged);
                report.rewritten = true;
                self.transfer
                    .upload(
                        target.as_ref(),
                        &object.name,
                        &object.content_type,
                        &StagedContent::Memory(bytes),
                    )
                    .await?
            }
        };
        report.bytes_written = written;
        report.advance(PipelineState::Completed)?;

        if self.config.delete_source {
            if object.bucket == self.config.target_bucket {
                tracing::warn!(
                    bucket = %object.bucket,
                    key = %object.name,
                    "Source and destination are the same object; not deleting"
                );
            } else {
                match source.delete(&object.name).await {
                    Ok(()) => report.source_deleted = true,
                    Err(e) => {
                        tracing::warn!(
                            bucket = %object.bucket,
                            key = %object.name,
                            error = %e,
                            "Failed to delete source after sanitizing"
                        );
                    }
                }
            }
        }

        Ok(())
    }

    async fn record_status(&self, object_id: &str, update: &StatusUpdate) -> Option<bool> {
        let store = self.status.as_ref()?;

        match store.update_status(object_id, update).await {
            Ok(true) => {
                tracing::info!(
                    store = %store.describe(),
                    object_id = %object_id,
                    status = %update.status,
                    "Status record updated"
                );
                Some(true)
            }
            Ok(false) => {
                tracing::info!(
                    store = %store.describe(),
                    object_id = %object_id,
                    "No status record for object"
                );
                Some(false)
            }
            Err(e) => {
                tracing::warn!(
                    store = %store.describe(),
                    object_id = %object_id,
                    error = %e,
                    "Failed to update status record"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{ContentSanitizer, SanitizeError};
    use async_trait::async_trait;
    use bytes::Bytes;
    use cleanroom_status::StatusResult;
    use cleanroom_storage::{BucketRegistry, Storage};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingStore {
        updates: Mutex<Vec<(String, StatusUpdate)>>,
    }

    #[async_trait]
    impl StatusStore for RecordingStore {
        async fn update_status(&self, object_id: &str, update: &StatusUpdate) -> StatusResult<bool> {
            self.updates
                .lock()
                .unwrap()
                .push((object_id.to_string(), update.clone()));
            Ok(true)
        }

        fn describe(&self) -> String {
            "recording".to_string()
        }
    }

    struct Uppercase;

    impl ContentSanitizer for Uppercase {
        fn kind(&self) -> ContentKind {
            ContentKind::Pdf
        }

        fn sanitize(&self, content: &StagedContent) -> Result<SanitizeOutcome, SanitizeError> {
            let data = content.to_bytes()?;
            Ok(SanitizeOutcome::Rewritten(Bytes::from(data.to_ascii_uppercase())))
        }
    }

    struct Panics;

    impl ContentSanitizer for Panics {
        fn kind(&self) -> ContentKind {
            ContentKind::Pdf
        }

        fn sanitize(&self, content: &StagedContent) -> Result<SanitizeOutcome, SanitizeError> {
            if content.to_bytes()?.starts_with(b"boom") {
                panic!("parser bug");
            }
            Ok(SanitizeOutcome::Unchanged)
        }
    }

    fn config(extra: &[(&str, &str)]) -> Arc<Config> {
        let mut vars = vec![("TARGET_BUCKET_NAME", "clean"), ("STORAGE_BACKEND", "memory")];
        vars.extend_from_slice(extra);
        Arc::new(
            Config::from_lookup(|key| {
                vars.iter()
                    .find(|(k, _)| *k == key)
                    .map(|(_, v)| v.to_string())
            })
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_rewritten_content_uploaded() {
        let storage = Arc::new(BucketRegistry::memory());
        let uploads = storage.bucket("uploads").unwrap();
        uploads
            .put_bytes("doc.pdf", "application/pdf", Bytes::from_static(b"hello"))
            .await
            .unwrap();

        let store = Arc::new(RecordingStore::default());
        let mut registry = SanitizerRegistry::new();
        registry.register(Arc::new(Uppercase));
        let pipeline = SanitizationPipeline::new(config(&[]), storage.clone(), Some(store.clone()))
            .with_sanitizers(registry);

        let object = ObjectDescriptor::new("doc.pdf", "uploads", 5, "application/pdf");
        let report = pipeline.process(&object).await;

        assert_eq!(report.state, PipelineState::Completed);
        assert!(report.rewritten);
        assert_eq!(report.bytes_written, 5);
        assert_eq!(report.status_record_found, Some(true));

        let clean = storage.bucket("clean").unwrap();
        assert_eq!(clean.get_bytes("doc.pdf").await.unwrap(), Bytes::from_static(b"HELLO"));

        let updates = store.updates.lock().unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].0, "doc.pdf");
        assert_eq!(
            updates[0].1.url.as_deref(),
            Some("https://storage.googleapis.com/clean/doc.pdf")
        );
    }

    #[tokio::test]
    async fn test_missing_sanitizer_is_a_rejection() {
        let storage = Arc::new(BucketRegistry::memory());
        let pipeline = SanitizationPipeline::new(config(&[]), storage, None)
            .with_sanitizers(SanitizerRegistry::new());

        let object = ObjectDescriptor::new("a.png", "uploads", 10, "image/png");
        let report = pipeline.process(&object).await;

        assert_eq!(report.state, PipelineState::Rejected);
        assert_eq!(report.error_code, Some("UNSUPPORTED_CONTENT_TYPE"));
        assert_eq!(report.status_record_found, None);
    }

    #[tokio::test]
    async fn test_missing_source_fails() {
        let storage = Arc::new(BucketRegistry::memory());
        let store = Arc::new(RecordingStore::default());
        let pipeline = SanitizationPipeline::new(config(&[]), storage, Some(store.clone()));

        let object = ObjectDescriptor::new("gone.pdf", "uploads", 10, "application/pdf");
        let report = pipeline.process(&object).await;

        assert_eq!(report.state, PipelineState::Failed);
        assert_eq!(report.error_code, Some("SOURCE_MISSING"));
        assert!(!report.is_success());

        let updates = store.updates.lock().unwrap();
        assert_eq!(updates[0].1.status, cleanroom_core::ProcessingStatus::Failed);
    }

    #[tokio::test]
    async fn test_same_bucket_never_deletes_output() {
        let storage = Arc::new(BucketRegistry::memory());
        let clean = storage.bucket("clean").unwrap();
        clean
            .put_bytes("doc.pdf", "application/pdf", Bytes::from_static(b"hello"))
            .await
            .unwrap();

        let mut registry = SanitizerRegistry::new();
        registry.register(Arc::new(Uppercase));
        let pipeline = SanitizationPipeline::new(
            config(&[("DELETE_SOURCE_AFTER_SANITIZE", "true")]),
            storage.clone(),
            None,
        )
        .with_sanitizers(registry);

        let object = ObjectDescriptor::new("doc.pdf", "clean", 5, "application/pdf");
        let report = pipeline.process(&object).await;

        assert!(report.is_success());
        assert!(!report.source_deleted);
        assert!(clean.exists("doc.pdf").await.unwrap());
    }

    #[tokio::test]
    async fn test_sanitizer_panic_fails_only_that_object() {
        let storage = Arc::new(BucketRegistry::memory());
        let uploads = storage.bucket("uploads").unwrap();
        uploads
            .put_bytes("bad.pdf", "application/pdf", Bytes::from_static(b"boom"))
            .await
            .unwrap();
        uploads
            .put_bytes("good.pdf", "application/pdf", Bytes::from_static(b"fine"))
            .await
            .unwrap();

        let store = Arc::new(RecordingStore::default());
        let mut registry = SanitizerRegistry::new();
        registry.register(Arc::new(Panics));
        let pipeline = SanitizationPipeline::new(config(&[]), storage.clone(), Some(store.clone()))
            .with_sanitizers(registry);

        let bad = pipeline
            .process(&ObjectDescriptor::new("bad.pdf", "uploads", 4, "application/pdf"))
            .await;
        let good = pipeline
            .process(&ObjectDescriptor::new("good.pdf", "uploads", 4, "application/pdf"))
            .await;

        assert_eq!(bad.state, PipelineState::Failed);
        assert_eq!(bad.error_code, Some("SANITIZER_FAILED"));
        assert_eq!(good.state, PipelineState::Completed);

        let clean = storage.bucket("clean").unwrap();
        assert!(!clean.exists("bad.pdf").await.unwrap());
        assert!(clean.exists("good.pdf").await.unwrap());

        let updates = store.updates.lock().unwrap();
        assert_eq!(updates[0].1.status, cleanroom_core::ProcessingStatus::Failed);
        assert_eq!(updates[1].1.status, cleanroom_core::ProcessingStatus::Processed);
    }

    #[test]
    fn test_report_serialization() {
        let object = ObjectDescriptor::new("c.exe", "uploads", 500, "application/octet-stream");
        let mut report = PipelineReport::new(&object, "clean");
        report.settle(PipelineState::Rejected);
        report.error_code = Some("UNSUPPORTED_CONTENT_TYPE");

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["state"], "rejected");
        assert_eq!(json["error_code"], "UNSUPPORTED_CONTENT_TYPE");
        assert!(json.get("error").is_none());
        assert_eq!(json["status_record_found"], serde_json::Value::Null);
    }
}
