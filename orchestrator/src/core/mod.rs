//! Core orchestration engine: rate limiting, queueing, workers, run
//! manifest, and the analytics that fold a run into a report

pub mod dispatcher;
pub mod drift;
pub mod manifest;
pub mod mii;
pub mod portfolio;
pub mod queue;
pub mod rate_limiter;
pub mod worker;

pub use dispatcher::{Dispatcher, RunOptions};
pub use drift::{DriftAggregator, DriftSummary};
pub use manifest::{ManifestCounts, ManifestSnapshot, ManifestStatus, RunManifest};
pub use mii::{HealthIndexCalculator, HealthIndexResult, MiiWeights};
pub use portfolio::{PortfolioAnalyzer, PortfolioReport, ProviderTier};
pub use queue::TaskQueue;
pub use rate_limiter::{RateLimitSlot, RateLimiter};
pub use worker::{ProviderWorker, TaskOutcome, MAX_CONSECUTIVE_FAILURES};
