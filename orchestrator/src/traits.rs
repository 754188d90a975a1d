//! Collaborator trait definitions with mockall annotations for testing
//!
//! The engine stays agnostic to how providers are discovered, how requests
//! are formatted on the wire, where drift signals come from, and where
//! checkpoints land. These traits are the seams; concrete implementations
//! live in `services`, mocks are generated for tests.

use uuid::Uuid;

use crate::core::manifest::ManifestSnapshot;
use crate::error::OrchestratorResult;
use shared::{CallFailure, CallSuccess, ProviderConfig};

/// Payload for one opaque provider call. The engine never inspects prompt
/// content; template filling belongs to the caller implementation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallPayload {
    pub subject: String,
    pub prompt_id: String,
}

/// Source of the active provider set for a run
#[mockall::automock]
#[async_trait::async_trait]
pub trait ProviderRegistry: Send + Sync {
    /// List providers eligible for task assignment, with their full
    /// rate-limit and retry configuration
    async fn list_active_providers(&self) -> OrchestratorResult<Vec<ProviderConfig>>;
}

/// Opaque execution of one provider request
///
/// The engine only inspects the success/failure classification and the
/// latency/token metadata; content passes through untouched.
#[mockall::automock]
#[async_trait::async_trait]
pub trait ProviderCaller: Send + Sync {
    async fn call(&self, config: ProviderConfig, payload: CallPayload) -> Result<CallSuccess, CallFailure>;
}

/// External drift signal source, one signal list per run
#[mockall::automock]
#[async_trait::async_trait]
pub trait DriftSource: Send + Sync {
    async fn drift_signals(&self, run_id: Uuid) -> OrchestratorResult<Vec<f64>>;
}

/// Durable persistence for manifest checkpoints
#[mockall::automock]
#[async_trait::async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Persist a snapshot. Saving the same snapshot twice must be a no-op.
    async fn save(&self, run_id: Uuid, snapshot: ManifestSnapshot) -> OrchestratorResult<()>;

    /// Load the most recent snapshot for a run, if any
    async fn load(&self, run_id: Uuid) -> OrchestratorResult<Option<ManifestSnapshot>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Mock generation sanity check
    #[tokio::test]
    async fn test_mock_trait_instantiation() {
        let _registry = MockProviderRegistry::new();
        let _caller = MockProviderCaller::new();
        let _drift = MockDriftSource::new();
        let _store = MockCheckpointStore::new();
    }
}
