//! Core types used throughout the orchestration engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use crate::errors::SharedError;

/// Text-generation providers the engine can schedule work against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderId {
    OpenAI,
    Anthropic,
    Groq,
    Together,
    /// Deterministic in-process provider used for dry runs and tests
    Synthetic,
}

impl ProviderId {
    /// All providers the registry knows about, in declaration order
    pub fn all() -> &'static [ProviderId] {
        &[
            ProviderId::OpenAI,
            ProviderId::Anthropic,
            ProviderId::Groq,
            ProviderId::Together,
            ProviderId::Synthetic,
        ]
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderId::OpenAI => write!(f, "openai"),
            ProviderId::Anthropic => write!(f, "anthropic"),
            ProviderId::Groq => write!(f, "groq"),
            ProviderId::Together => write!(f, "together"),
            ProviderId::Synthetic => write!(f, "synthetic"),
        }
    }
}

impl std::str::FromStr for ProviderId {
    type Err = SharedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(ProviderId::OpenAI),
            "anthropic" => Ok(ProviderId::Anthropic),
            "groq" => Ok(ProviderId::Groq),
            "together" => Ok(ProviderId::Together),
            "synthetic" => Ok(ProviderId::Synthetic),
            _ => Err(SharedError::UnknownProvider { input: s.to_string() }),
        }
    }
}

/// Static per-provider configuration, loaded once at registry build time
/// and read-only for the lifetime of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub provider_id: ProviderId,
    pub model_id: String,
    /// Model family used when reassigning a degraded provider's work
    pub model_family: String,
    pub requests_per_minute: u32,
    pub requests_per_hour: u32,
    pub max_concurrency: u32,
    pub base_retry_delay: Duration,
    pub backoff_multiplier: f64,
    pub max_retries: u32,
    /// Base task priority, 1 (lowest) to 10 (highest)
    pub priority: u8,
    pub call_timeout: Duration,
}

impl ProviderConfig {
    pub fn validate(&self) -> Result<(), SharedError> {
        if !(1..=10).contains(&self.priority) {
            return Err(SharedError::InvalidConfig {
                field: "priority".to_string(),
                value: self.priority.to_string(),
            });
        }
        if self.max_concurrency == 0 {
            return Err(SharedError::InvalidConfig {
                field: "max_concurrency".to_string(),
                value: "0".to_string(),
            });
        }
        if self.backoff_multiplier < 1.0 {
            return Err(SharedError::InvalidConfig {
                field: "backoff_multiplier".to_string(),
                value: self.backoff_multiplier.to_string(),
            });
        }
        Ok(())
    }
}

/// One unit of expected work: query one provider with one prompt for one
/// subject. The combo key fields never change after creation; only
/// `priority` and `attempt` move, and only through an explicit requeue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub subject: String,
    pub prompt_id: String,
    pub provider_id: ProviderId,
    pub model_id: String,
    pub priority: u8,
    pub attempt: u32,
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn new(subject: String, prompt_id: String, config: &ProviderConfig) -> Self {
        Self {
            subject,
            prompt_id,
            provider_id: config.provider_id,
            model_id: config.model_id.clone(),
            priority: config.priority,
            attempt: 0,
            created_at: Utc::now(),
        }
    }

    pub fn combo_key(&self) -> ComboKey {
        ComboKey {
            subject: self.subject.clone(),
            prompt_id: self.prompt_id.clone(),
            provider_id: self.provider_id,
        }
    }
}

/// Unique (subject, prompt, provider) triple identifying one expected
/// observation in a run
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComboKey {
    pub subject: String,
    pub prompt_id: String,
    pub provider_id: ProviderId,
}

impl fmt::Display for ComboKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}|{}", self.subject, self.prompt_id, self.provider_id)
    }
}

/// Lifecycle of an expected observation within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObservationStatus {
    Queued,
    Success,
    Error,
}

impl ObservationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ObservationStatus::Success | ObservationStatus::Error)
    }
}

/// One recorded attempt outcome for a combo. Append-only from the worker's
/// point of view; the manifest upserts by combo key, last write wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunObservation {
    pub subject: String,
    pub prompt_id: String,
    pub provider_id: ProviderId,
    pub model_id: String,
    pub status: ObservationStatus,
    pub attempts: u32,
    pub latency_ms: Option<u64>,
    pub tokens: Option<u32>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl RunObservation {
    pub fn combo_key(&self) -> ComboKey {
        ComboKey {
            subject: self.subject.clone(),
            prompt_id: self.prompt_id.clone(),
            provider_id: self.provider_id,
        }
    }
}

/// Coverage thresholds separating the run health tiers. Deployment
/// configuration, not constants.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CoverageThresholds {
    pub min_floor: f64,
    pub target_coverage: f64,
}

impl Default for CoverageThresholds {
    fn default() -> Self {
        Self {
            min_floor: 0.70,
            target_coverage: 0.95,
        }
    }
}

impl CoverageThresholds {
    pub fn validate(&self) -> Result<(), SharedError> {
        if !(0.0..=1.0).contains(&self.min_floor) {
            return Err(SharedError::InvalidConfig {
                field: "min_floor".to_string(),
                value: self.min_floor.to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.target_coverage) {
            return Err(SharedError::InvalidConfig {
                field: "target_coverage".to_string(),
                value: self.target_coverage.to_string(),
            });
        }
        if self.min_floor > self.target_coverage {
            return Err(SharedError::InvalidConfig {
                field: "min_floor".to_string(),
                value: format!("{} > target_coverage {}", self.min_floor, self.target_coverage),
            });
        }
        Ok(())
    }
}

/// Coarse run health classification derived from coverage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TierLevel {
    Invalid,
    Degraded,
    Healthy,
}

impl TierLevel {
    /// Boundary-inclusive on the lower edge of each tier: exactly
    /// `min_floor` is Degraded, exactly `target_coverage` is Healthy.
    pub fn from_coverage(coverage: f64, thresholds: &CoverageThresholds) -> Self {
        if coverage < thresholds.min_floor {
            TierLevel::Invalid
        } else if coverage >= thresholds.target_coverage {
            TierLevel::Healthy
        } else {
            TierLevel::Degraded
        }
    }
}

impl fmt::Display for TierLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TierLevel::Invalid => write!(f, "Invalid"),
            TierLevel::Degraded => write!(f, "Degraded"),
            TierLevel::Healthy => write!(f, "Healthy"),
        }
    }
}

/// Successful result of one opaque provider call
#[derive(Debug, Clone)]
pub struct CallSuccess {
    pub content: String,
    pub tokens: u32,
    pub latency_ms: u64,
}

/// Failure classification for one opaque provider call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallFailure {
    /// Remote 429-equivalent; the caller should back the provider off
    RateLimited { retry_after_secs: Option<u64> },
    Timeout,
    Network { message: String },
    Server { status: String },
    AuthenticationFailed,
    InvalidResponse { message: String },
}

impl CallFailure {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, CallFailure::RateLimited { .. })
    }
}

impl fmt::Display for CallFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallFailure::RateLimited { retry_after_secs } => match retry_after_secs {
                Some(secs) => write!(f, "rate limited (retry after {secs}s)"),
                None => write!(f, "rate limited"),
            },
            CallFailure::Timeout => write!(f, "call timed out"),
            CallFailure::Network { message } => write!(f, "network error: {message}"),
            CallFailure::Server { status } => write!(f, "server error: {status}"),
            CallFailure::AuthenticationFailed => write!(f, "authentication failed"),
            CallFailure::InvalidResponse { message } => write!(f, "invalid response: {message}"),
        }
    }
}

/// Trend label comparing the current run against the previous one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrendLabel {
    Improving,
    Stable,
    Degrading,
}

impl fmt::Display for TrendLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrendLabel::Improving => write!(f, "improving"),
            TrendLabel::Stable => write!(f, "stable"),
            TrendLabel::Degrading => write!(f, "degrading"),
        }
    }
}

/// One scored dimension of the health index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DimensionScore {
    pub dimension: String,
    pub score: f64,
    pub trend: TrendLabel,
}

/// Structured result of one orchestrated run. This is the only output
/// contract a surrounding CLI or service layer should depend on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub coverage: f64,
    pub tier: TierLevel,
    pub mii_score: f64,
    pub mii_dimensions: Vec<DimensionScore>,
    pub successful: usize,
    pub failed: usize,
    pub drift_detected: bool,
    pub checkpoint_ok: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_id_round_trip() {
        for provider in ProviderId::all() {
            let parsed: ProviderId = provider.to_string().parse().unwrap();
            assert_eq!(parsed, *provider);
        }
        assert!("acme-llm".parse::<ProviderId>().is_err());
    }

    #[test]
    fn test_tier_boundaries_are_lower_inclusive() {
        let thresholds = CoverageThresholds::default();
        assert_eq!(TierLevel::from_coverage(0.6999, &thresholds), TierLevel::Invalid);
        assert_eq!(TierLevel::from_coverage(0.70, &thresholds), TierLevel::Degraded);
        assert_eq!(TierLevel::from_coverage(0.9499, &thresholds), TierLevel::Degraded);
        assert_eq!(TierLevel::from_coverage(0.95, &thresholds), TierLevel::Healthy);
        assert_eq!(TierLevel::from_coverage(1.0, &thresholds), TierLevel::Healthy);
    }

    #[test]
    fn test_threshold_validation_rejects_inverted_bounds() {
        let bad = CoverageThresholds {
            min_floor: 0.96,
            target_coverage: 0.95,
        };
        assert!(bad.validate().is_err());
        assert!(CoverageThresholds::default().validate().is_ok());
    }

    #[test]
    fn test_combo_key_identity() {
        let config = ProviderConfig {
            provider_id: ProviderId::Synthetic,
            model_id: "synthetic-1".to_string(),
            model_family: "synthetic".to_string(),
            requests_per_minute: 60,
            requests_per_hour: 1000,
            max_concurrency: 4,
            base_retry_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            max_retries: 3,
            priority: 5,
            call_timeout: Duration::from_secs(30),
        };
        let task = Task::new("example.com".to_string(), "summarize_v1".to_string(), &config);
        let key = task.combo_key();
        assert_eq!(key.subject, "example.com");
        assert_eq!(key.prompt_id, "summarize_v1");
        assert_eq!(key.provider_id, ProviderId::Synthetic);
        assert_eq!(key.to_string(), "example.com|summarize_v1|synthetic");
    }
}
