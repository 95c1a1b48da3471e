use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// Outcome written to a status record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Processed,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Processed => "processed",
            ProcessingStatus::Failed => "failed",
        }
    }
}

impl Display for ProcessingStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// Status store backend types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusBackend {
    /// Key-value entity store
    Datastore,
    /// Document store
    Firestore,
}

impl FromStr for StatusBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "datastore" => Ok(StatusBackend::Datastore),
            "firestore" => Ok(StatusBackend::Firestore),
            _ => Err(anyhow::anyhow!(
                "Invalid status backend: {} (expected 'datastore' or 'firestore')",
                s
            )),
        }
    }
}

impl Display for StatusBackend {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            StatusBackend::Datastore => write!(f, "datastore"),
            StatusBackend::Firestore => write!(f, "firestore"),
        }
    }
}
