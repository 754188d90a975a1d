//! Provider portfolio assessment
//!
//! Folds per-provider run outcomes into a coarse tier per provider and one
//! aggregate quality score. Deliberately shallow: the point is a summary a
//! run report can carry, not a recommendation engine.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use shared::{ObservationStatus, ProviderId, RunObservation};

/// Role a provider earned this run based on its success rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderTier {
    /// Success rate >= 0.90: safe to lean on
    Primary,
    /// Success rate >= 0.70: usable with supervision
    Secondary,
    /// Below 0.70: keep only as a last resort
    Fallback,
}

impl ProviderTier {
    fn from_success_rate(rate: f64) -> Self {
        if rate >= 0.90 {
            ProviderTier::Primary
        } else if rate >= 0.70 {
            ProviderTier::Secondary
        } else {
            ProviderTier::Fallback
        }
    }

    /// Contribution of one provider at this tier to the aggregate score
    fn weight(&self) -> f64 {
        match self {
            ProviderTier::Primary => 100.0,
            ProviderTier::Secondary => 70.0,
            ProviderTier::Fallback => 30.0,
        }
    }
}

/// One provider's showing in a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderAssessment {
    pub provider_id: ProviderId,
    pub expected: usize,
    pub successful: usize,
    pub failed: usize,
    pub success_rate: f64,
    pub tier: ProviderTier,
}

/// Portfolio-level summary of one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioReport {
    pub assessments: Vec<ProviderAssessment>,
    /// Mean tier weight across assessed providers, 0-100. Zero when no
    /// provider had any expected work.
    pub quality_score: f64,
}

impl PortfolioReport {
    /// One-line advisory per provider that fell out of the Primary tier
    pub fn recommendations(&self) -> Vec<String> {
        self.assessments
            .iter()
            .filter(|a| a.tier != ProviderTier::Primary)
            .map(|a| {
                format!(
                    "{}: success rate {:.0}% this run, consider {} its share of work",
                    a.provider_id,
                    a.success_rate * 100.0,
                    match a.tier {
                        ProviderTier::Secondary => "reviewing",
                        _ => "reducing",
                    }
                )
            })
            .collect()
    }
}

#[derive(Debug, Default)]
pub struct PortfolioAnalyzer;

impl PortfolioAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Group observations by the provider that was expected to serve them
    /// and grade each provider on its terminal outcomes
    pub fn analyze(&self, observations: &[RunObservation]) -> PortfolioReport {
        let mut per_provider: HashMap<ProviderId, (usize, usize, usize)> = HashMap::new();
        for obs in observations {
            let entry = per_provider.entry(obs.provider_id).or_default();
            entry.0 += 1;
            match obs.status {
                ObservationStatus::Success => entry.1 += 1,
                ObservationStatus::Error => entry.2 += 1,
                ObservationStatus::Queued => {}
            }
        }

        let mut assessments: Vec<ProviderAssessment> = per_provider
            .into_iter()
            .map(|(provider_id, (expected, successful, failed))| {
                let success_rate = if expected == 0 {
                    0.0
                } else {
                    successful as f64 / expected as f64
                };
                ProviderAssessment {
                    provider_id,
                    expected,
                    successful,
                    failed,
                    success_rate,
                    tier: ProviderTier::from_success_rate(success_rate),
                }
            })
            .collect();
        assessments.sort_by_key(|a| a.provider_id.to_string());

        let quality_score = if assessments.is_empty() {
            0.0
        } else {
            assessments.iter().map(|a| a.tier.weight()).sum::<f64>() / assessments.len() as f64
        };

        PortfolioReport {
            assessments,
            quality_score,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn obs(provider: ProviderId, subject: &str, status: ObservationStatus) -> RunObservation {
        RunObservation {
            subject: subject.to_string(),
            prompt_id: "prompt_v1".to_string(),
            provider_id: provider,
            model_id: "model-1".to_string(),
            status,
            attempts: 1,
            latency_ms: Some(100),
            tokens: Some(64),
            error: None,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_empty_run_scores_zero() {
        let report = PortfolioAnalyzer::new().analyze(&[]);
        assert!(report.assessments.is_empty());
        assert_eq!(report.quality_score, 0.0);
    }

    #[test]
    fn test_tier_bands() {
        assert_eq!(ProviderTier::from_success_rate(0.95), ProviderTier::Primary);
        assert_eq!(ProviderTier::from_success_rate(0.90), ProviderTier::Primary);
        assert_eq!(ProviderTier::from_success_rate(0.89), ProviderTier::Secondary);
        assert_eq!(ProviderTier::from_success_rate(0.70), ProviderTier::Secondary);
        assert_eq!(ProviderTier::from_success_rate(0.69), ProviderTier::Fallback);
        assert_eq!(ProviderTier::from_success_rate(0.0), ProviderTier::Fallback);
    }

    #[test]
    fn test_mixed_fleet_assessment() {
        let mut observations = Vec::new();
        // Provider A: 4/4 successes
        for subject in ["a", "b", "c", "d"] {
            observations.push(obs(ProviderId::OpenAI, subject, ObservationStatus::Success));
        }
        // Provider B: 2/4 successes
        observations.push(obs(ProviderId::Groq, "a", ObservationStatus::Success));
        observations.push(obs(ProviderId::Groq, "b", ObservationStatus::Success));
        observations.push(obs(ProviderId::Groq, "c", ObservationStatus::Error));
        observations.push(obs(ProviderId::Groq, "d", ObservationStatus::Error));

        let report = PortfolioAnalyzer::new().analyze(&observations);
        assert_eq!(report.assessments.len(), 2);

        let groq = report
            .assessments
            .iter()
            .find(|a| a.provider_id == ProviderId::Groq)
            .unwrap();
        assert_eq!(groq.tier, ProviderTier::Fallback);
        assert_eq!(groq.success_rate, 0.5);
        assert_eq!(groq.failed, 2);

        let openai = report
            .assessments
            .iter()
            .find(|a| a.provider_id == ProviderId::OpenAI)
            .unwrap();
        assert_eq!(openai.tier, ProviderTier::Primary);

        // (100 + 30) / 2
        assert_eq!(report.quality_score, 65.0);
    }

    #[test]
    fn test_queued_counts_toward_expected_not_success() {
        let observations = vec![
            obs(ProviderId::Anthropic, "a", ObservationStatus::Success),
            obs(ProviderId::Anthropic, "b", ObservationStatus::Queued),
        ];
        let report = PortfolioAnalyzer::new().analyze(&observations);
        let anthropic = &report.assessments[0];
        assert_eq!(anthropic.expected, 2);
        assert_eq!(anthropic.successful, 1);
        assert_eq!(anthropic.success_rate, 0.5);
    }

    #[test]
    fn test_recommendations_cover_non_primary_providers() {
        let observations = vec![
            obs(ProviderId::OpenAI, "a", ObservationStatus::Success),
            obs(ProviderId::Groq, "a", ObservationStatus::Error),
        ];
        let report = PortfolioAnalyzer::new().analyze(&observations);
        let recs = report.recommendations();
        assert_eq!(recs.len(), 1);
        assert!(recs[0].contains("groq"));
    }
}
