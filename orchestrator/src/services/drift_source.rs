//! Drift signal source implementations
//!
//! Real deployments feed drift signals from a statistics pipeline outside
//! this crate. The engine only needs the collaborator contract; these
//! implementations cover static configuration and the no-signal case.

use uuid::Uuid;

use crate::error::OrchestratorResult;
use crate::traits::DriftSource;

/// Fixed signal list, identical for every run
pub struct StaticDriftSource {
    signals: Vec<f64>,
}

impl StaticDriftSource {
    pub fn new(signals: Vec<f64>) -> Self {
        Self { signals }
    }

    /// No drift evidence at all
    pub fn none() -> Self {
        Self::new(Vec::new())
    }
}

#[async_trait::async_trait]
impl DriftSource for StaticDriftSource {
    async fn drift_signals(&self, _run_id: Uuid) -> OrchestratorResult<Vec<f64>> {
        Ok(self.signals.clone())
    }
}
