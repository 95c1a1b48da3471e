use serde::Serialize;
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Per-object pipeline state.
///
/// ```text
/// Admitted -> Downloading -> Sanitizing -> Uploading -> Completed
///    |             |             |            |
///    v             +-------------+------------+--> Failed
/// Rejected
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Admitted,
    Downloading,
    Sanitizing,
    Uploading,
    Completed,
    Rejected,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Invalid pipeline transition from {from} to {to}")]
pub struct InvalidTransition {
    pub from: PipelineState,
    pub to: PipelineState,
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineState::Completed | PipelineState::Rejected | PipelineState::Failed
        )
    }

    pub fn can_transition_to(&self, next: PipelineState) -> bool {
        use PipelineState::*;

        matches!(
            (*self, next),
            (Admitted, Downloading)
                | (Admitted, Rejected)
                | (Downloading, Sanitizing)
                | (Sanitizing, Uploading)
                | (Uploading, Completed)
                | (Downloading, Failed)
                | (Sanitizing, Failed)
                | (Uploading, Failed)
        )
    }

    pub fn transition(self, next: PipelineState) -> Result<PipelineState, InvalidTransition> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(InvalidTransition {
                from: self,
                to: next,
            })
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Admitted => "admitted",
            PipelineState::Downloading => "downloading",
            PipelineState::Sanitizing => "sanitizing",
            PipelineState::Uploading => "uploading",
            PipelineState::Completed => "completed",
            PipelineState::Rejected => "rejected",
            PipelineState::Failed => "failed",
        }
    }
}

impl Display for PipelineState {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}
