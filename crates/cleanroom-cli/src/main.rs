//! cleanroom: replay storage trigger events through the sanitization pipeline.
//!
//! Configuration comes from the environment (a `.env` file is honoured).
//! Set `LOG_FORMAT=json` for one JSON object per log line.

use anyhow::Context;
use clap::{Parser, Subcommand};
use cleanroom_cli::{build_pipeline, init_tracing, load_events, LogFormat};
use cleanroom_core::Config;
use cleanroom_processing::{PipelineReport, PipelineState};
use futures::stream::{self, StreamExt};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "cleanroom", about = "Sanitize objects named by storage trigger events")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process trigger payload files and print one JSON report per object
    Process {
        /// Payload files: a wrapped `{data, context}` event, a bare object, or an array
        #[arg(required = true)]
        payloads: Vec<PathBuf>,
        /// Maximum number of objects processed at once
        #[arg(long, default_value = "4")]
        concurrency: usize,
        /// Pretty-print reports
        #[arg(long)]
        pretty: bool,
    },
    /// Validate configuration and exit
    CheckConfig,
}

fn print_report(report: &PipelineReport, pretty: bool) -> anyhow::Result<()> {
    let out = if pretty {
        serde_json::to_string_pretty(report)
    } else {
        serde_json::to_string(report)
    }
    .context("Serialize report")?;
    println!("{}", out);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing(LogFormat::from_env());

    let cli = Cli::parse();
    let config = Arc::new(Config::from_env().context("Invalid configuration")?);

    match cli.command {
        Commands::CheckConfig => {
            build_pipeline(config.clone())?;
            let summary = serde_json::json!({
                "environment": config.environment,
                "target_bucket": config.target_bucket,
                "storage_backend": config.storage_backend.to_string(),
                "max_file_size": config.max_file_size,
                "status_store": config.status_store.as_ref().map(|s| format!("{}/{}", s.backend, s.name)),
                "delete_source": config.delete_source,
                "report_rejections": config.report_rejections,
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Process {
            payloads,
            concurrency,
            pretty,
        } => {
            let pipeline = Arc::new(build_pipeline(config)?);

            let mut objects = Vec::new();
            for path in &payloads {
                objects.extend(load_events(path)?);
            }
            tracing::info!(
                objects = objects.len(),
                concurrency,
                "Replaying trigger events"
            );

            let reports: Vec<PipelineReport> = stream::iter(objects)
                .map(|object| {
                    let pipeline = pipeline.clone();
                    async move { pipeline.process(&object).await }
                })
                .buffer_unordered(concurrency.max(1))
                .collect()
                .await;

            for report in &reports {
                print_report(report, pretty)?;
            }

            let failed = reports
                .iter()
                .filter(|r| r.state == PipelineState::Failed)
                .count();
            if failed > 0 {
                anyhow::bail!("{} of {} object(s) failed", failed, reports.len());
            }
        }
    }

    Ok(())
}
