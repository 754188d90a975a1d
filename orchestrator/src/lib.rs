//! Orchestration engine for scheduled multi-provider analysis runs
//!
//! Enumerates a bounded set of (subject x prompt x provider) combinations
//! once per scheduling window, executes them under per-provider rate
//! limits with retry and health tracking, and folds the outcome into a
//! coverage tier and a weighted health index.

pub mod core;
pub mod error;
pub mod services;
pub mod traits;

// Re-export commonly used types
pub use core::{
    Dispatcher, DriftAggregator, HealthIndexCalculator, MiiWeights, PortfolioAnalyzer,
    RunManifest, RunOptions,
};
pub use error::{OrchestratorError, OrchestratorResult};
pub use traits::{CallPayload, CheckpointStore, DriftSource, ProviderCaller, ProviderRegistry};
