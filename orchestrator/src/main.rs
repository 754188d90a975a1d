//! Main entry point for the orchestrator binary
//!
//! Wires the real service implementations into the dispatcher and runs one
//! scheduling window, printing a run summary and optionally writing the
//! full report as JSON.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::info;

use orchestrator::{
    core::MiiWeights,
    services::{EnvProviderRegistry, FileCheckpointStore, HttpProviderCaller, StaticDriftSource},
    Dispatcher, OrchestratorResult, RunOptions,
};
use shared::{logging, CoverageThresholds};

/// Orchestrates scheduled multi-provider analysis runs
#[derive(Parser)]
#[command(name = "orchestrator")]
#[command(about = "Runs the (subject x prompt x provider) swarm for one scheduling window")]
pub struct Args {
    /// Scheduling window size in hours
    #[arg(long, default_value = "24")]
    pub window_hours: u32,

    /// Dry run: synthetic successes, no provider calls
    #[arg(long)]
    pub dry_run: bool,

    /// Subjects to analyze (repeatable)
    #[arg(long = "subject", required = true)]
    pub subjects: Vec<String>,

    /// Prompt identifiers to apply to every subject (repeatable)
    #[arg(long = "prompt", default_value = "summary_v1")]
    pub prompts: Vec<String>,

    /// Include the keyless synthetic provider in the fleet
    #[arg(long)]
    pub synthetic: bool,

    /// Wall-clock budget for the run, in seconds
    #[arg(long, default_value = "3600")]
    pub budget_secs: u64,

    /// Seconds between manifest checkpoints
    #[arg(long, default_value = "30")]
    pub checkpoint_secs: u64,

    /// Directory for manifest checkpoints
    #[arg(long, default_value = "./checkpoints")]
    pub checkpoint_dir: PathBuf,

    /// Coverage below this is an Invalid run
    #[arg(long, default_value = "0.70")]
    pub min_floor: f64,

    /// Coverage at or above this is a Healthy run
    #[arg(long, default_value = "0.95")]
    pub target_coverage: f64,

    /// Previous run's MII score, for the trend label
    #[arg(long)]
    pub previous_score: Option<f64>,

    /// Write the full run report as JSON to this path
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

#[tokio::main]
async fn main() -> OrchestratorResult<()> {
    let args = Args::parse();
    logging::init_tracing(Some(&args.log_level));
    logging::log_startup("orchestrator run");

    let registry = if args.synthetic {
        EnvProviderRegistry::new().with_synthetic()
    } else {
        EnvProviderRegistry::new()
    };
    let caller = Arc::new(HttpProviderCaller::new(EnvProviderRegistry::api_keys()));
    let checkpoint_store = FileCheckpointStore::new(&args.checkpoint_dir);

    let options = RunOptions {
        subjects: args.subjects.clone(),
        prompt_ids: args.prompts.clone(),
        thresholds: CoverageThresholds {
            min_floor: args.min_floor,
            target_coverage: args.target_coverage,
        },
        weights: MiiWeights::default(),
        drift_threshold: 0.10,
        budget: Duration::from_secs(args.budget_secs),
        checkpoint_interval: Duration::from_secs(args.checkpoint_secs),
        previous_score: args.previous_score,
        contract_scores: HashMap::new(),
    };

    let dispatcher = Dispatcher::new(
        registry,
        caller,
        StaticDriftSource::none(),
        checkpoint_store,
        options,
    )?;

    let report = dispatcher.run(args.window_hours, args.dry_run).await?;

    info!(
        "📊 Run {} | coverage {:.1}% ({}) | MII {:.1} | {} ok, {} failed | drift={} | checkpoint_ok={}",
        report.run_id,
        report.coverage * 100.0,
        report.tier,
        report.mii_score,
        report.successful,
        report.failed,
        report.drift_detected,
        report.checkpoint_ok
    );
    for dimension in &report.mii_dimensions {
        info!(
            "   {} = {:.1} ({})",
            dimension.dimension, dimension.score, dimension.trend
        );
    }

    if let Some(path) = &args.report {
        let json = serde_json::to_string_pretty(&report)?;
        tokio::fs::write(path, json).await?;
        logging::log_success(&format!("Report written to {}", path.display()));
    }

    logging::log_shutdown("run complete");
    Ok(())
}
