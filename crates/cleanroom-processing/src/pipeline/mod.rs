//! Per-object sanitization pipeline

mod error;
mod runner;
mod state;

pub use error::PipelineError;
pub use runner::{PipelineReport, SanitizationPipeline};
pub use state::{InvalidTransition, PipelineState};
