//! Shared fixtures for dispatcher integration tests

use std::collections::HashMap;
use std::time::Duration;

use orchestrator::traits::{CallPayload, ProviderCaller};
use orchestrator::RunOptions;
use shared::{CallFailure, CallSuccess, ProviderConfig, ProviderId};

/// Provider config tuned for fast tests: millisecond retry delays, generous
/// local limits so rate limiting never interferes unless a test wants it to
pub fn provider(id: ProviderId, family: &str, priority: u8, max_retries: u32) -> ProviderConfig {
    ProviderConfig {
        provider_id: id,
        model_id: format!("{id}-model"),
        model_family: family.to_string(),
        requests_per_minute: 10_000,
        requests_per_hour: 100_000,
        max_concurrency: 8,
        base_retry_delay: Duration::from_millis(1),
        backoff_multiplier: 2.0,
        max_retries,
        priority,
        call_timeout: Duration::from_secs(5),
    }
}

/// Run options sized for tests: short budget, frequent checkpoints
pub fn options(subjects: &[&str], prompts: &[&str]) -> RunOptions {
    RunOptions {
        subjects: subjects.iter().map(|s| s.to_string()).collect(),
        prompt_ids: prompts.iter().map(|p| p.to_string()).collect(),
        budget: Duration::from_secs(10),
        checkpoint_interval: Duration::from_millis(100),
        ..RunOptions::default()
    }
}

/// How a scripted provider behaves for every call it receives
#[derive(Debug, Clone, Copy)]
pub enum Behavior {
    Succeed,
    /// Transient failure on every call
    Fail,
    /// Sleep, then succeed; used to exercise the run budget
    SlowSucceed(Duration),
}

/// Caller whose behavior is fixed per provider
pub struct ScriptedCaller {
    behaviors: HashMap<ProviderId, Behavior>,
}

impl ScriptedCaller {
    pub fn new(behaviors: impl IntoIterator<Item = (ProviderId, Behavior)>) -> Self {
        Self {
            behaviors: behaviors.into_iter().collect(),
        }
    }
}

#[async_trait::async_trait]
impl ProviderCaller for ScriptedCaller {
    async fn call(
        &self,
        config: ProviderConfig,
        payload: CallPayload,
    ) -> Result<CallSuccess, CallFailure> {
        match self.behaviors.get(&config.provider_id) {
            Some(Behavior::Succeed) | None => Ok(CallSuccess {
                content: format!("{}:{}", payload.subject, payload.prompt_id),
                tokens: 32,
                latency_ms: 1,
            }),
            Some(Behavior::Fail) => Err(CallFailure::Server {
                status: "503 Service Unavailable".to_string(),
            }),
            Some(Behavior::SlowSucceed(delay)) => {
                tokio::time::sleep(*delay).await;
                Ok(CallSuccess {
                    content: format!("{}:{}", payload.subject, payload.prompt_id),
                    tokens: 32,
                    latency_ms: delay.as_millis() as u64,
                })
            }
        }
    }
}
