//! Run manifest and coverage accounting
//!
//! The manifest is the single source of truth for what a run was supposed
//! to observe and what it actually observed. It is seeded with one Queued
//! observation per expected (subject, prompt, provider) combination before
//! any work starts, so coverage is always measured against the full
//! expected set, never against whatever happened to complete.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::{OrchestratorError, OrchestratorResult};
use shared::{ComboKey, CoverageThresholds, ObservationStatus, RunObservation, TierLevel};

/// Manifest lifecycle. A closed manifest refuses further observation
/// updates; it can still be snapshotted and read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ManifestStatus {
    Open,
    Closed,
}

/// Aggregate counters derived from the observation map
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManifestCounts {
    pub expected: usize,
    pub successful: usize,
    pub failed: usize,
    pub queued: usize,
}

/// Serializable point-in-time view of a manifest. Observations are sorted
/// by combo key so the same logical state always serializes to the same
/// bytes, which is what makes checkpoint writes idempotent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestSnapshot {
    pub run_id: Uuid,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub status: ManifestStatus,
    pub thresholds: CoverageThresholds,
    pub observations: Vec<RunObservation>,
}

#[derive(Debug)]
struct ManifestState {
    status: ManifestStatus,
    observations: HashMap<ComboKey, RunObservation>,
}

#[derive(Debug)]
pub struct RunManifest {
    run_id: Uuid,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    thresholds: CoverageThresholds,
    state: Mutex<ManifestState>,
}

impl RunManifest {
    /// Build a manifest seeded with a Queued observation for every expected
    /// combination
    pub fn new(
        run_id: Uuid,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        thresholds: CoverageThresholds,
        expected: impl IntoIterator<Item = (ComboKey, String)>,
    ) -> Self {
        let observations = expected
            .into_iter()
            .map(|(key, model_id)| {
                let seed = RunObservation {
                    subject: key.subject.clone(),
                    prompt_id: key.prompt_id.clone(),
                    provider_id: key.provider_id,
                    model_id,
                    status: ObservationStatus::Queued,
                    attempts: 0,
                    latency_ms: None,
                    tokens: None,
                    error: None,
                    timestamp: Utc::now(),
                };
                (key, seed)
            })
            .collect();

        Self {
            run_id,
            window_start,
            window_end,
            thresholds,
            state: Mutex::new(ManifestState {
                status: ManifestStatus::Open,
                observations,
            }),
        }
    }

    /// Rebuild a manifest from a persisted snapshot
    pub fn restore(snapshot: ManifestSnapshot) -> Self {
        let observations = snapshot
            .observations
            .into_iter()
            .map(|obs| (obs.combo_key(), obs))
            .collect();

        Self {
            run_id: snapshot.run_id,
            window_start: snapshot.window_start,
            window_end: snapshot.window_end,
            thresholds: snapshot.thresholds,
            state: Mutex::new(ManifestState {
                status: snapshot.status,
                observations,
            }),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn window_start(&self) -> DateTime<Utc> {
        self.window_start
    }

    pub fn window_end(&self) -> DateTime<Utc> {
        self.window_end
    }

    pub fn thresholds(&self) -> CoverageThresholds {
        self.thresholds
    }

    /// Record the outcome of one attempt. Upserts by combo key with one
    /// guard: a combo that already reached Success is never downgraded, so
    /// replaying the same outcome (or a stale late failure) cannot change
    /// the final state.
    pub fn update_observation(&self, observation: RunObservation) -> OrchestratorResult<()> {
        let key = observation.combo_key();
        let mut state = self.state.lock().expect("manifest lock poisoned");

        if state.status == ManifestStatus::Closed {
            return Err(OrchestratorError::ManifestClosed { run_id: self.run_id });
        }

        let slot = state
            .observations
            .get_mut(&key)
            .ok_or_else(|| OrchestratorError::UnknownCombo { key: key.to_string() })?;

        if slot.status == ObservationStatus::Success && observation.status != ObservationStatus::Success {
            debug!("⏭️ Ignoring non-success update for already-successful combo {}", key);
            return Ok(());
        }

        *slot = observation;
        Ok(())
    }

    /// Fraction of expected combinations that reached Success. Zero
    /// expected combinations is defined as zero coverage.
    pub fn coverage(&self) -> f64 {
        let counts = self.counts();
        if counts.expected == 0 {
            return 0.0;
        }
        counts.successful as f64 / counts.expected as f64
    }

    pub fn tier(&self) -> TierLevel {
        TierLevel::from_coverage(self.coverage(), &self.thresholds)
    }

    pub fn counts(&self) -> ManifestCounts {
        let state = self.state.lock().expect("manifest lock poisoned");
        let mut counts = ManifestCounts {
            expected: state.observations.len(),
            successful: 0,
            failed: 0,
            queued: 0,
        };
        for obs in state.observations.values() {
            match obs.status {
                ObservationStatus::Success => counts.successful += 1,
                ObservationStatus::Error => counts.failed += 1,
                ObservationStatus::Queued => counts.queued += 1,
            }
        }
        counts
    }

    /// Successes over terminal observations. Combos still Queued carry no
    /// evidence either way and are excluded.
    pub fn success_rate(&self) -> f64 {
        let counts = self.counts();
        let terminal = counts.successful + counts.failed;
        if terminal == 0 {
            return 0.0;
        }
        counts.successful as f64 / terminal as f64
    }

    /// Mean recorded latency across successful observations, if any
    pub fn avg_latency_ms(&self) -> Option<f64> {
        let state = self.state.lock().expect("manifest lock poisoned");
        let latencies: Vec<u64> = state
            .observations
            .values()
            .filter(|obs| obs.status == ObservationStatus::Success)
            .filter_map(|obs| obs.latency_ms)
            .collect();
        if latencies.is_empty() {
            return None;
        }
        Some(latencies.iter().sum::<u64>() as f64 / latencies.len() as f64)
    }

    pub fn status(&self) -> ManifestStatus {
        self.state.lock().expect("manifest lock poisoned").status
    }

    /// Close the manifest; any combo still Queued is marked Error so the
    /// final accounting has no indeterminate entries
    pub fn close(&self, reason: &str) {
        let mut state = self.state.lock().expect("manifest lock poisoned");
        if state.status == ManifestStatus::Closed {
            return;
        }
        let now = Utc::now();
        for obs in state.observations.values_mut() {
            if obs.status == ObservationStatus::Queued {
                obs.status = ObservationStatus::Error;
                obs.error = Some(reason.to_string());
                obs.timestamp = now;
            }
        }
        state.status = ManifestStatus::Closed;
    }

    /// Deterministic point-in-time view for checkpointing
    pub fn snapshot(&self) -> ManifestSnapshot {
        let state = self.state.lock().expect("manifest lock poisoned");
        let mut observations: Vec<RunObservation> = state.observations.values().cloned().collect();
        observations.sort_by_key(|obs| obs.combo_key().to_string());

        ManifestSnapshot {
            run_id: self.run_id,
            window_start: self.window_start,
            window_end: self.window_end,
            status: state.status,
            thresholds: self.thresholds,
            observations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::ProviderId;

    fn combo(subject: &str, provider: ProviderId) -> (ComboKey, String) {
        (
            ComboKey {
                subject: subject.to_string(),
                prompt_id: "prompt_v1".to_string(),
                provider_id: provider,
            },
            "model-1".to_string(),
        )
    }

    fn manifest_with(expected: Vec<(ComboKey, String)>) -> RunManifest {
        let now = Utc::now();
        RunManifest::new(
            Uuid::new_v4(),
            now,
            now + chrono::Duration::hours(24),
            CoverageThresholds::default(),
            expected,
        )
    }

    fn success_for(key: &ComboKey) -> RunObservation {
        RunObservation {
            subject: key.subject.clone(),
            prompt_id: key.prompt_id.clone(),
            provider_id: key.provider_id,
            model_id: "model-1".to_string(),
            status: ObservationStatus::Success,
            attempts: 1,
            latency_ms: Some(120),
            tokens: Some(256),
            error: None,
            timestamp: Utc::now(),
        }
    }

    fn error_for(key: &ComboKey, message: &str) -> RunObservation {
        RunObservation {
            status: ObservationStatus::Error,
            error: Some(message.to_string()),
            latency_ms: None,
            tokens: None,
            ..success_for(key)
        }
    }

    #[test]
    fn test_seeded_manifest_has_zero_coverage() {
        let manifest = manifest_with(vec![
            combo("a", ProviderId::Synthetic),
            combo("b", ProviderId::Synthetic),
        ]);

        let counts = manifest.counts();
        assert_eq!(counts.expected, 2);
        assert_eq!(counts.queued, 2);
        assert_eq!(manifest.coverage(), 0.0);
        assert_eq!(manifest.tier(), TierLevel::Invalid);
    }

    #[test]
    fn test_coverage_counts_only_successes() {
        let (key_a, model_a) = combo("a", ProviderId::Synthetic);
        let (key_b, model_b) = combo("b", ProviderId::Synthetic);
        let manifest = manifest_with(vec![(key_a.clone(), model_a), (key_b.clone(), model_b)]);

        manifest.update_observation(success_for(&key_a)).unwrap();
        manifest.update_observation(error_for(&key_b, "timeout")).unwrap();

        assert_eq!(manifest.coverage(), 0.5);
        let counts = manifest.counts();
        assert_eq!(counts.successful, 1);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.queued, 0);
    }

    #[test]
    fn test_update_is_idempotent() {
        let (key, model) = combo("a", ProviderId::Synthetic);
        let manifest = manifest_with(vec![(key.clone(), model)]);

        manifest.update_observation(success_for(&key)).unwrap();
        manifest.update_observation(success_for(&key)).unwrap();

        assert_eq!(manifest.coverage(), 1.0);
        assert_eq!(manifest.counts().successful, 1);
    }

    #[test]
    fn test_success_is_never_downgraded() {
        let (key, model) = combo("a", ProviderId::Synthetic);
        let manifest = manifest_with(vec![(key.clone(), model)]);

        manifest.update_observation(success_for(&key)).unwrap();
        manifest.update_observation(error_for(&key, "late failure")).unwrap();

        assert_eq!(manifest.coverage(), 1.0);
        assert_eq!(manifest.counts().failed, 0);
    }

    #[test]
    fn test_error_can_be_upgraded_to_success() {
        let (key, model) = combo("a", ProviderId::Synthetic);
        let manifest = manifest_with(vec![(key.clone(), model)]);

        manifest.update_observation(error_for(&key, "flake")).unwrap();
        manifest.update_observation(success_for(&key)).unwrap();

        assert_eq!(manifest.coverage(), 1.0);
    }

    #[test]
    fn test_success_rate_ignores_queued_combos() {
        let (key_a, model_a) = combo("a", ProviderId::Synthetic);
        let (key_b, model_b) = combo("b", ProviderId::Synthetic);
        let (key_c, model_c) = combo("c", ProviderId::Synthetic);
        let manifest =
            manifest_with(vec![(key_a.clone(), model_a), (key_b.clone(), model_b), (key_c, model_c)]);

        assert_eq!(manifest.success_rate(), 0.0);

        manifest.update_observation(success_for(&key_a)).unwrap();
        manifest.update_observation(error_for(&key_b, "timeout")).unwrap();

        // One Queued combo remains but only terminal outcomes count
        assert_eq!(manifest.success_rate(), 0.5);
        assert_eq!(manifest.coverage(), 1.0 / 3.0);
    }

    #[test]
    fn test_avg_latency_covers_successes_only() {
        let (key_a, model_a) = combo("a", ProviderId::Synthetic);
        let (key_b, model_b) = combo("b", ProviderId::Synthetic);
        let (key_c, model_c) = combo("c", ProviderId::Synthetic);
        let manifest =
            manifest_with(vec![(key_a.clone(), model_a), (key_b.clone(), model_b), (key_c.clone(), model_c)]);

        assert_eq!(manifest.avg_latency_ms(), None);

        let mut fast = success_for(&key_a);
        fast.latency_ms = Some(100);
        let mut slow = success_for(&key_b);
        slow.latency_ms = Some(300);
        manifest.update_observation(fast).unwrap();
        manifest.update_observation(slow).unwrap();
        manifest.update_observation(error_for(&key_c, "refused")).unwrap();

        assert_eq!(manifest.avg_latency_ms(), Some(200.0));
    }

    #[test]
    fn test_unknown_combo_is_rejected() {
        let manifest = manifest_with(vec![combo("a", ProviderId::Synthetic)]);
        let (stranger, _) = combo("not-seeded", ProviderId::OpenAI);

        let result = manifest.update_observation(success_for(&stranger));
        assert!(matches!(result, Err(OrchestratorError::UnknownCombo { .. })));
    }

    #[test]
    fn test_close_marks_queued_as_error_and_rejects_updates() {
        let (key_a, model_a) = combo("a", ProviderId::Synthetic);
        let (key_b, model_b) = combo("b", ProviderId::Synthetic);
        let manifest = manifest_with(vec![(key_a.clone(), model_a), (key_b, model_b)]);

        manifest.update_observation(success_for(&key_a)).unwrap();
        manifest.close("budget expired");

        assert_eq!(manifest.status(), ManifestStatus::Closed);
        let counts = manifest.counts();
        assert_eq!(counts.successful, 1);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.queued, 0);

        let result = manifest.update_observation(success_for(&key_a));
        assert!(matches!(result, Err(OrchestratorError::ManifestClosed { .. })));
    }

    #[test]
    fn test_snapshot_is_deterministic() {
        let (key_a, model_a) = combo("b-later", ProviderId::Synthetic);
        let (key_b, model_b) = combo("a-earlier", ProviderId::OpenAI);
        let manifest = manifest_with(vec![(key_a.clone(), model_a), (key_b, model_b)]);
        manifest.update_observation(success_for(&key_a)).unwrap();

        let first = serde_json::to_string(&manifest.snapshot()).unwrap();
        let second = serde_json::to_string(&manifest.snapshot()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_restore_round_trip() {
        let (key_a, model_a) = combo("a", ProviderId::Synthetic);
        let (key_b, model_b) = combo("b", ProviderId::Synthetic);
        let manifest = manifest_with(vec![(key_a.clone(), model_a), (key_b, model_b)]);
        manifest.update_observation(success_for(&key_a)).unwrap();

        let restored = RunManifest::restore(manifest.snapshot());
        assert_eq!(restored.run_id(), manifest.run_id());
        assert_eq!(restored.coverage(), manifest.coverage());
        assert_eq!(restored.counts(), manifest.counts());
        assert_eq!(restored.status(), ManifestStatus::Open);
    }
}
