use anyhow::Context;
use cleanroom_core::{Config, ObjectDescriptor, TriggerEvent};
use cleanroom_processing::SanitizationPipeline;
use cleanroom_status::create_status_store;
use cleanroom_storage::create_storage_provider;
use std::path::Path;
use std::sync::Arc;

/// Log line format, selected with `LOG_FORMAT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    /// One JSON object per event, for log collectors.
    Json,
}

impl LogFormat {
    pub fn from_env() -> Self {
        Self::parse(std::env::var("LOG_FORMAT").ok().as_deref())
    }

    pub fn parse(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Text,
        }
    }
}

/// Initialize tracing for the CLI. Logs go to stderr so reports on stdout
/// stay machine-readable.
pub fn init_tracing(format: LogFormat) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

/// Wire storage, status store and sanitizers from configuration.
pub fn build_pipeline(config: Arc<Config>) -> anyhow::Result<SanitizationPipeline> {
    let storage = create_storage_provider(&config).context("Failed to initialize storage")?;

    let status = match &config.status_store {
        Some(store) => Some(create_status_store(store).context("Failed to initialize status store")?),
        None => None,
    };

    Ok(SanitizationPipeline::new(config, storage, status))
}

/// Parse trigger payloads: one event (wrapped or bare) or an array of them.
pub fn parse_events(json: &str) -> anyhow::Result<Vec<ObjectDescriptor>> {
    let value: serde_json::Value = serde_json::from_str(json).context("Payload is not JSON")?;

    let events: Vec<TriggerEvent> = match value {
        serde_json::Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| {
                serde_json::from_value(item).with_context(|| format!("Invalid event at index {}", i))
            })
            .collect::<anyhow::Result<_>>()?,
        other => vec![serde_json::from_value(other).context("Invalid event")?],
    };

    Ok(events.into_iter().map(TriggerEvent::into_descriptor).collect())
}

pub fn load_events(path: &Path) -> anyhow::Result<Vec<ObjectDescriptor>> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    parse_events(&json).with_context(|| format!("Failed to parse {}", path.display()))
}
