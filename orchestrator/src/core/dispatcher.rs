//! Swarm dispatcher: fans the (subject x prompt x provider) cross-product
//! out across per-provider workers and drives the run to a structured
//! result
//!
//! The dispatcher never talks to a provider directly. It owns the run
//! lifecycle: manifest seeding, worker loops, periodic checkpoints,
//! reassignment away from unhealthy providers, and the final fold into a
//! run report. All per-task errors are absorbed here; only configuration
//! problems abort a run before dispatch.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::{interval, sleep, Instant};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::core::drift::DriftAggregator;
use crate::core::manifest::{ManifestStatus, RunManifest};
use crate::core::mii::{HealthIndexCalculator, MiiWeights};
use crate::core::portfolio::PortfolioAnalyzer;
use crate::core::worker::{ProviderWorker, TaskOutcome};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::traits::{CallPayload, CheckpointStore, DriftSource, ProviderCaller, ProviderRegistry};
use shared::{
    CallSuccess, ComboKey, CoverageThresholds, ObservationStatus, ProviderConfig, RunObservation,
    RunReport, SharedError, Task,
};

/// Pause for an idle worker loop between queue polls
const IDLE_POLL: Duration = Duration::from_millis(25);

/// Pause after local backpressure before the next attempt
const BACKPRESSURE_POLL: Duration = Duration::from_millis(10);

/// Monitor loop cadence for drain/budget/health checks
const MONITOR_TICK: Duration = Duration::from_millis(250);

/// Everything configurable about a run besides the window itself
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub subjects: Vec<String>,
    pub prompt_ids: Vec<String>,
    pub thresholds: CoverageThresholds,
    pub weights: MiiWeights,
    pub drift_threshold: f64,
    /// Wall-clock budget; the run terminates when it expires even if work
    /// remains queued
    pub budget: Duration,
    pub checkpoint_interval: Duration,
    /// Previous run's MII score, if the caller persisted one
    pub previous_score: Option<f64>,
    /// External 0-100 quality grades folded into the portfolio dimension
    pub contract_scores: HashMap<String, f64>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            subjects: Vec::new(),
            prompt_ids: Vec::new(),
            thresholds: CoverageThresholds::default(),
            weights: MiiWeights::default(),
            drift_threshold: 0.10,
            budget: Duration::from_secs(3600),
            checkpoint_interval: Duration::from_secs(30),
            previous_score: None,
            contract_scores: HashMap::new(),
        }
    }
}

/// State shared between the monitor and every worker loop for one run
struct RunShared {
    manifest: Arc<RunManifest>,
    /// Combos that have not reached a terminal observation yet
    outstanding: AtomicUsize,
    running: AtomicBool,
    checkpoint_ok: AtomicBool,
}

/// Stand-in caller for dry runs: every combo succeeds synthetically, and
/// the injected caller is never touched
struct DryRunCaller;

#[async_trait::async_trait]
impl ProviderCaller for DryRunCaller {
    async fn call(
        &self,
        _config: ProviderConfig,
        payload: CallPayload,
    ) -> Result<CallSuccess, shared::CallFailure> {
        Ok(CallSuccess {
            content: format!("dry-run:{}:{}", payload.subject, payload.prompt_id),
            tokens: 0,
            latency_ms: 0,
        })
    }
}

pub struct Dispatcher<R, C, D, S>
where
    R: ProviderRegistry,
    C: ProviderCaller + 'static,
    D: DriftSource,
    S: CheckpointStore,
{
    registry: R,
    caller: Arc<C>,
    drift_source: D,
    checkpoint_store: S,
    options: RunOptions,
}

impl<R, C, D, S> Dispatcher<R, C, D, S>
where
    R: ProviderRegistry,
    C: ProviderCaller + 'static,
    D: DriftSource,
    S: CheckpointStore,
{
    pub fn new(
        registry: R,
        caller: Arc<C>,
        drift_source: D,
        checkpoint_store: S,
        options: RunOptions,
    ) -> OrchestratorResult<Self> {
        options.weights.validate()?;
        options.thresholds.validate()?;
        if options.subjects.is_empty() {
            return Err(OrchestratorError::config("subject list is empty"));
        }
        if options.prompt_ids.is_empty() {
            return Err(OrchestratorError::config("prompt list is empty"));
        }
        Ok(Self {
            registry,
            caller,
            drift_source,
            checkpoint_store,
            options,
        })
    }

    /// Execute one full run and fold it into a report. `dry_run` swaps the
    /// injected caller for a synthetic always-success one while exercising
    /// queueing, manifest accounting, checkpoints, and index calculation
    /// unchanged.
    pub async fn run(&self, window_hours: u32, dry_run: bool) -> OrchestratorResult<RunReport> {
        if window_hours == 0 {
            return Err(SharedError::InvalidWindow {
                message: "window_hours must be at least 1".to_string(),
            }
            .into());
        }

        let providers = self.registry.list_active_providers().await?;
        if providers.is_empty() {
            return Err(OrchestratorError::NoActiveProviders);
        }
        for config in &providers {
            config.validate()?;
        }

        let run_id = Uuid::new_v4();
        let window_start = Utc::now();
        let window_end = window_start + chrono::Duration::hours(i64::from(window_hours));

        let caller: Arc<dyn ProviderCaller> = if dry_run {
            Arc::new(DryRunCaller)
        } else {
            self.caller.clone()
        };

        let workers: Vec<Arc<ProviderWorker>> = providers
            .iter()
            .map(|config| Arc::new(ProviderWorker::new(config.clone(), caller.clone())))
            .collect();

        // Expected set and the per-provider queues are seeded from the same
        // cross-product, so coverage is measured against everything queued
        let mut expected: Vec<(ComboKey, String)> = Vec::new();
        for worker in &workers {
            let config = worker.config();
            for subject in &self.options.subjects {
                for prompt_id in &self.options.prompt_ids {
                    let task = Task::new(subject.clone(), prompt_id.clone(), config);
                    expected.push((task.combo_key(), config.model_id.clone()));
                    worker.queue().push(task);
                }
            }
        }
        let total = expected.len();

        let shared = Arc::new(RunShared {
            manifest: Arc::new(RunManifest::new(
                run_id,
                window_start,
                window_end,
                self.options.thresholds,
                expected,
            )),
            outstanding: AtomicUsize::new(total),
            running: AtomicBool::new(true),
            checkpoint_ok: AtomicBool::new(true),
        });

        info!(
            "🚀 Run {} dispatching {} combos across {} providers (dry_run={})",
            run_id,
            total,
            workers.len(),
            dry_run
        );

        let handles: Vec<_> = workers
            .iter()
            .map(|worker| {
                let worker = Arc::clone(worker);
                let shared = Arc::clone(&shared);
                tokio::spawn(worker_loop(worker, shared))
            })
            .collect();

        self.monitor(&workers, &shared).await;

        for handle in handles {
            if let Err(join_err) = handle.await {
                error!("❌ Worker loop aborted: {}", join_err);
            }
        }

        // Manifests always end Closed; the reason only matters for combos
        // that never reached a terminal state
        if shared.manifest.status() == ManifestStatus::Open {
            if shared.outstanding.load(Ordering::SeqCst) > 0 {
                shared.manifest.close("run budget expired");
            } else {
                shared.manifest.close("run complete");
            }
        }

        // Terminal checkpoint; its outcome feeds checkpoint_ok like every
        // periodic one before it
        self.checkpoint(&shared).await;

        let snapshot = shared.manifest.snapshot();
        let counts = shared.manifest.counts();
        let coverage = shared.manifest.coverage();
        let tier = shared.manifest.tier();

        let drift = match self.drift_source.drift_signals(run_id).await {
            Ok(signals) => DriftAggregator::new(self.options.drift_threshold).aggregate(&signals),
            Err(err) => {
                // A missing drift signal weakens the stability dimension's
                // evidence, not the run itself
                warn!("⚠️ Drift source unavailable: {}", err);
                DriftAggregator::new(self.options.drift_threshold).aggregate(&[])
            }
        };

        let portfolio = PortfolioAnalyzer::new().analyze(&snapshot.observations);
        let index = HealthIndexCalculator::new(self.options.weights, self.options.thresholds)?
            .calculate(
                counts,
                coverage,
                portfolio.quality_score,
                drift,
                &self.options.contract_scores,
                self.options.previous_score,
            );

        let checkpoint_ok = shared.checkpoint_ok.load(Ordering::SeqCst);
        info!(
            "✅ Run {} finished: coverage {:.1}% ({}), success rate {:.1}%, avg latency {}, MII {:.1}, checkpoint_ok={}",
            run_id,
            coverage * 100.0,
            tier,
            shared.manifest.success_rate() * 100.0,
            shared
                .manifest
                .avg_latency_ms()
                .map(|ms| format!("{ms:.0}ms"))
                .unwrap_or_else(|| "n/a".to_string()),
            index.mii_score,
            checkpoint_ok
        );

        Ok(RunReport {
            run_id,
            window_start,
            window_end,
            coverage,
            tier,
            mii_score: index.mii_score,
            mii_dimensions: index.dimensions,
            successful: counts.successful,
            failed: counts.failed,
            drift_detected: drift.detected,
            checkpoint_ok,
        })
    }

    /// Load a previously checkpointed manifest, if the store has one
    pub async fn restore_manifest(&self, run_id: Uuid) -> OrchestratorResult<Option<RunManifest>> {
        Ok(self
            .checkpoint_store
            .load(run_id)
            .await?
            .map(RunManifest::restore))
    }

    /// Drive the run to termination: periodic checkpoints, reassignment
    /// away from unhealthy providers, drain detection, and the wall-clock
    /// budget
    async fn monitor(&self, workers: &[Arc<ProviderWorker>], shared: &Arc<RunShared>) {
        let started = Instant::now();
        let mut last_checkpoint = Instant::now();
        let mut ticker = interval(MONITOR_TICK);

        loop {
            ticker.tick().await;

            self.reassign_from_unhealthy(workers, shared);

            if last_checkpoint.elapsed() >= self.options.checkpoint_interval {
                self.checkpoint(shared).await;
                last_checkpoint = Instant::now();
            }

            if shared.outstanding.load(Ordering::SeqCst) == 0 {
                info!("🏁 All combos terminal, draining worker loops");
                shared.running.store(false, Ordering::SeqCst);
                return;
            }

            if started.elapsed() >= self.options.budget {
                warn!(
                    "⏰ Run budget {:?} expired with {} combos outstanding",
                    self.options.budget,
                    shared.outstanding.load(Ordering::SeqCst)
                );
                shared.running.store(false, Ordering::SeqCst);
                return;
            }
        }
    }

    /// Move an unhealthy provider's remaining queued work to the
    /// highest-priority healthy provider serving the same model family, or
    /// mark it failed when no such provider exists. Combo identity never
    /// changes, so the original expected slot still gets its observation.
    fn reassign_from_unhealthy(&self, workers: &[Arc<ProviderWorker>], shared: &Arc<RunShared>) {
        for worker in workers {
            if worker.is_healthy() || worker.queue().is_empty() {
                continue;
            }

            let orphaned = worker.queue().drain_all();
            let family = &worker.config().model_family;
            let target = workers
                .iter()
                .filter(|w| {
                    w.is_healthy()
                        && w.provider_id() != worker.provider_id()
                        && w.config().model_family == *family
                })
                .max_by_key(|w| w.config().priority);

            match target {
                Some(target) => {
                    info!(
                        "🔀 Reassigning {} tasks from unhealthy {} to {}",
                        orphaned.len(),
                        worker.provider_id(),
                        target.provider_id()
                    );
                    for task in orphaned {
                        target.queue().push(task);
                    }
                }
                None => {
                    warn!(
                        "🪦 No healthy {} provider left, failing {} tasks from {}",
                        family,
                        orphaned.len(),
                        worker.provider_id()
                    );
                    for task in orphaned {
                        record_terminal(
                            shared,
                            &task,
                            task.attempt,
                            format!("provider {} unhealthy, no reassignment target", task.provider_id),
                        );
                    }
                }
            }
        }
    }

    async fn checkpoint(&self, shared: &Arc<RunShared>) {
        let snapshot = shared.manifest.snapshot();
        let run_id = snapshot.run_id;
        if let Err(err) = self.checkpoint_store.save(run_id, snapshot).await {
            error!("❌ Checkpoint for run {} failed: {}", run_id, err);
            shared.checkpoint_ok.store(false, Ordering::SeqCst);
        }
    }
}

/// One provider's pull-execute-report loop. Exits when the run stops or
/// the provider goes unhealthy; orphaned queue contents are handled by the
/// monitor's reassignment pass.
async fn worker_loop(worker: Arc<ProviderWorker>, shared: Arc<RunShared>) {
    while shared.running.load(Ordering::SeqCst) && worker.is_healthy() {
        let Some(task) = worker.queue().pop() else {
            sleep(IDLE_POLL).await;
            continue;
        };

        match worker.process_task(task).await {
            TaskOutcome::Completed(mut observations) => {
                // One observation per completed attempt; only the last is
                // terminal and settles the combo
                let terminal = observations.pop();
                for attempt in observations {
                    if let Err(err) = shared.manifest.update_observation(attempt) {
                        warn!("⚠️ Dropped attempt observation: {}", err);
                    }
                }
                if let Some(terminal) = terminal {
                    apply_observation(&shared, terminal);
                }
            }
            TaskOutcome::RateLimited(task) => {
                if task.attempt >= worker.config().max_retries {
                    let attempts = task.attempt + 1;
                    record_terminal(
                        &shared,
                        &task,
                        attempts,
                        "rate limited, requeue budget exhausted".to_string(),
                    );
                } else {
                    worker.queue().requeue_demoted(task);
                }
            }
            TaskOutcome::Backpressure(task) => {
                worker.queue().requeue_unchanged(task);
                sleep(BACKPRESSURE_POLL).await;
            }
        }
    }
}

fn apply_observation(shared: &Arc<RunShared>, observation: RunObservation) {
    match shared.manifest.update_observation(observation) {
        Ok(()) => {
            shared.outstanding.fetch_sub(1, Ordering::SeqCst);
        }
        Err(err) => warn!("⚠️ Dropped observation: {}", err),
    }
}

fn record_terminal(shared: &Arc<RunShared>, task: &Task, attempts: u32, error: String) {
    let observation = RunObservation {
        subject: task.subject.clone(),
        prompt_id: task.prompt_id.clone(),
        provider_id: task.provider_id,
        model_id: task.model_id.clone(),
        status: ObservationStatus::Error,
        attempts,
        latency_ms: None,
        tokens: None,
        error: Some(error),
        timestamp: Utc::now(),
    };
    apply_observation(shared, observation);
}
