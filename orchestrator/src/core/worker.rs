//! Per-provider worker: executes tasks against one provider with retry,
//! backoff, and consecutive-failure health tracking

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};

use crate::core::queue::TaskQueue;
use crate::core::rate_limiter::RateLimiter;
use crate::traits::{CallPayload, ProviderCaller};
use shared::{CallFailure, ObservationStatus, ProviderConfig, ProviderId, RunObservation, Task};

/// A provider is declared unhealthy once its consecutive failure count
/// exceeds this threshold
pub const MAX_CONSECUTIVE_FAILURES: u32 = 10;

/// Ceiling on the exponential retry delay inside one task attempt
const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Fallback backoff when a rate-limit response carries no retry-after hint
const DEFAULT_BACKOFF: Duration = Duration::from_secs(30);

/// What happened to one task handed to a worker
#[derive(Debug)]
pub enum TaskOutcome {
    /// The task reached a terminal state. One observation per completed
    /// attempt, in order; the last one is the terminal outcome.
    Completed(Vec<RunObservation>),
    /// The provider rate-limited us remotely. The limiter is already backing
    /// off; the task goes back to the dispatcher for a demoted requeue.
    RateLimited(Task),
    /// No local rate-limit slot was available. No attempt was made; the
    /// task goes back unchanged.
    Backpressure(Task),
}

/// One provider's execution arm. Owns the provider's rate limiter and
/// queue; health state is monotonic within a run (an unhealthy provider
/// only recovers on the next run).
pub struct ProviderWorker {
    config: ProviderConfig,
    limiter: Arc<RateLimiter>,
    queue: Arc<TaskQueue>,
    caller: Arc<dyn ProviderCaller>,
    consecutive_failures: AtomicU32,
    healthy: AtomicBool,
}

impl ProviderWorker {
    pub fn new(config: ProviderConfig, caller: Arc<dyn ProviderCaller>) -> Self {
        let limiter = Arc::new(RateLimiter::new(&config));
        Self {
            config,
            limiter,
            queue: Arc::new(TaskQueue::new()),
            caller,
            consecutive_failures: AtomicU32::new(0),
            healthy: AtomicBool::new(true),
        }
    }

    pub fn provider_id(&self) -> ProviderId {
        self.config.provider_id
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub fn queue(&self) -> &Arc<TaskQueue> {
        &self.queue
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::SeqCst)
    }

    /// Execute one task end to end: acquire a slot, run the call with the
    /// provider's retry policy, and classify the outcome
    pub async fn process_task(&self, task: Task) -> TaskOutcome {
        let Some(_slot) = self.limiter.try_acquire() else {
            return TaskOutcome::Backpressure(task);
        };

        let payload = CallPayload {
            subject: task.subject.clone(),
            prompt_id: task.prompt_id.clone(),
        };

        let mut attempts: Vec<RunObservation> = Vec::new();
        let mut tries: u32 = 0;
        loop {
            tries += 1;
            // The collaborator is bounded here regardless of whether it
            // honors the timeout itself; a hung call must not stall the
            // worker loop past the per-call budget
            let call = self.caller.call(self.config.clone(), payload.clone());
            let result = match tokio::time::timeout(self.config.call_timeout, call).await {
                Ok(result) => result,
                Err(_) => Err(CallFailure::Timeout),
            };

            match result {
                Ok(success) => {
                    self.record_success();
                    attempts.push(self.observation(
                        &task,
                        tries,
                        ObservationStatus::Success,
                        Some(success.latency_ms),
                        Some(success.tokens),
                        None,
                    ));
                    return TaskOutcome::Completed(attempts);
                }
                Err(CallFailure::RateLimited { retry_after_secs }) => {
                    // Backoff is the designated response to a remote rate
                    // limit; it says nothing about the provider's health
                    let backoff = retry_after_secs
                        .map(Duration::from_secs)
                        .unwrap_or(DEFAULT_BACKOFF);
                    warn!(
                        "⏳ {} rate limited, backing off {:?}",
                        self.config.provider_id, backoff
                    );
                    self.limiter.set_backoff(backoff);
                    return TaskOutcome::RateLimited(task);
                }
                Err(CallFailure::AuthenticationFailed) => {
                    // Credentials won't fix themselves mid-run; fail fast
                    self.record_failure();
                    attempts.push(self.observation(
                        &task,
                        tries,
                        ObservationStatus::Error,
                        None,
                        None,
                        Some(CallFailure::AuthenticationFailed.to_string()),
                    ));
                    return TaskOutcome::Completed(attempts);
                }
                Err(failure) => {
                    attempts.push(self.observation(
                        &task,
                        tries,
                        ObservationStatus::Error,
                        None,
                        None,
                        Some(failure.to_string()),
                    ));
                    if tries <= self.config.max_retries {
                        let delay = self.retry_delay(tries - 1);
                        debug!(
                            "🔁 {} attempt {} failed ({}), retrying in {:?}",
                            self.config.provider_id, tries, failure, delay
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    self.record_failure();
                    return TaskOutcome::Completed(attempts);
                }
            }
        }
    }

    /// Delay before retry number `retry` (zero-based):
    /// base * multiplier^retry, capped
    fn retry_delay(&self, retry: u32) -> Duration {
        let scaled = self.config.base_retry_delay.as_secs_f64()
            * self.config.backoff_multiplier.powi(retry as i32);
        Duration::from_secs_f64(scaled).min(MAX_RETRY_DELAY)
    }

    fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
    }

    fn record_failure(&self) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        if failures > MAX_CONSECUTIVE_FAILURES && self.healthy.swap(false, Ordering::SeqCst) {
            warn!(
                "💔 {} marked unhealthy after {} consecutive failures",
                self.config.provider_id, failures
            );
        }
    }

    fn observation(
        &self,
        task: &Task,
        tries: u32,
        status: ObservationStatus,
        latency_ms: Option<u64>,
        tokens: Option<u32>,
        error: Option<String>,
    ) -> RunObservation {
        RunObservation {
            // Combo identity comes from the task so reassigned work still
            // lands on its original expected slot
            subject: task.subject.clone(),
            prompt_id: task.prompt_id.clone(),
            provider_id: task.provider_id,
            // The model that actually executed is this worker's
            model_id: self.config.model_id.clone(),
            status,
            attempts: task.attempt + tries,
            latency_ms,
            tokens,
            error,
            timestamp: Utc::now(),
        }
    }
}
