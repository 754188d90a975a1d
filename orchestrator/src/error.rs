//! Orchestrator-specific error types

use shared::SharedError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Run configuration error: {message}")]
    Configuration { message: String },

    #[error("Provider registry returned no active providers")]
    NoActiveProviders,

    #[error("Manifest already closed: {run_id}")]
    ManifestClosed { run_id: Uuid },

    #[error("Observation outside expected combination set: {key}")]
    UnknownCombo { key: String },

    #[error("Checkpoint store failure: {message}")]
    CheckpointFailed { message: String },

    #[error("Drift source failure: {message}")]
    DriftSourceFailed { message: String },

    #[error("Shared component error")]
    Shared(#[from] SharedError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl OrchestratorError {
    pub fn config(message: impl Into<String>) -> Self {
        OrchestratorError::Configuration { message: message.into() }
    }
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;
