//! Shared types for the provider swarm orchestration engine
//!
//! This crate holds the data model used across the workspace: provider
//! identities and configuration, work items, observations, coverage tiers,
//! and the structured run report, plus the common error type and tracing
//! setup helpers.

pub mod errors;
pub mod logging;
pub mod types;

pub use errors::{SharedError, SharedResult};
pub use types::{
    CallFailure, CallSuccess, ComboKey, CoverageThresholds, DimensionScore, ObservationStatus,
    ProviderConfig, ProviderId, RunObservation, RunReport, Task, TierLevel, TrendLabel,
};
