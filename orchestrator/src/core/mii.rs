//! Model Intelligence Index (MII) calculation
//!
//! Folds a finished run's coverage, reliability, drift-derived stability,
//! and portfolio quality into one 0-100 score with a per-dimension
//! breakdown and a trend label against the previous run's score.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::drift::DriftSummary;
use crate::core::manifest::ManifestCounts;
use crate::error::{OrchestratorError, OrchestratorResult};
use shared::{CoverageThresholds, DimensionScore, TierLevel, TrendLabel};

/// Score delta against the previous run below which the trend is Stable
const TREND_TOLERANCE: f64 = 2.0;

/// Dimension weights for the index. Coverage and reliability dominate;
/// stability tempers them; portfolio quality enters as a multiplier rather
/// than a fourth additive term.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MiiWeights {
    pub coverage: f64,
    pub reliability: f64,
    pub stability: f64,
}

impl Default for MiiWeights {
    fn default() -> Self {
        Self {
            coverage: 0.4,
            reliability: 0.4,
            stability: 0.2,
        }
    }
}

impl MiiWeights {
    pub fn validate(&self) -> OrchestratorResult<()> {
        let sum = self.coverage + self.reliability + self.stability;
        if (sum - 1.0).abs() > 1e-6 {
            return Err(OrchestratorError::config(format!(
                "MII weights must sum to 1.0, got {sum}"
            )));
        }
        if self.coverage < 0.0 || self.reliability < 0.0 || self.stability < 0.0 {
            return Err(OrchestratorError::config("MII weights must be non-negative"));
        }
        Ok(())
    }
}

/// Computed health index for one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthIndexResult {
    pub mii_score: f64,
    pub health_status: TierLevel,
    pub trend: TrendLabel,
    pub dimensions: Vec<DimensionScore>,
}

#[derive(Debug, Clone)]
pub struct HealthIndexCalculator {
    weights: MiiWeights,
    thresholds: CoverageThresholds,
}

impl HealthIndexCalculator {
    pub fn new(weights: MiiWeights, thresholds: CoverageThresholds) -> OrchestratorResult<Self> {
        weights.validate()?;
        thresholds.validate()?;
        Ok(Self { weights, thresholds })
    }

    /// Compute the index for a finished run.
    ///
    /// `portfolio_quality` is the portfolio analyzer's 0-100 aggregate;
    /// `contract_scores` are optional external 0-100 quality grades that,
    /// when present, average into the portfolio dimension. `previous_score`
    /// drives the overall trend label and is the caller's responsibility to
    /// persist between runs.
    pub fn calculate(
        &self,
        counts: ManifestCounts,
        coverage: f64,
        portfolio_quality: f64,
        drift: DriftSummary,
        contract_scores: &HashMap<String, f64>,
        previous_score: Option<f64>,
    ) -> HealthIndexResult {
        // Nothing expected means nothing to score. Guarded branch, never a
        // division by zero.
        if counts.expected == 0 {
            return HealthIndexResult {
                mii_score: 0.0,
                health_status: TierLevel::Invalid,
                trend: overall_trend(0.0, previous_score),
                dimensions: vec![
                    dimension("coverage", 0.0),
                    dimension("reliability", 0.0),
                    dimension("stability", 0.0),
                    dimension("portfolio", 0.0),
                ],
            };
        }

        let coverage_score = (coverage.clamp(0.0, 1.0)) * 100.0;

        let terminal = counts.successful + counts.failed;
        let reliability_score = if terminal == 0 {
            0.0
        } else {
            counts.successful as f64 / terminal as f64 * 100.0
        };

        let stability_score = (1.0 - drift.scalar).clamp(0.0, 1.0) * 100.0;

        let portfolio_score = if contract_scores.is_empty() {
            portfolio_quality
        } else {
            let contract_mean = contract_scores.values().copied().sum::<f64>()
                / contract_scores.len() as f64;
            (portfolio_quality + contract_mean) / 2.0
        }
        .clamp(0.0, 100.0);

        let base = self.weights.coverage * coverage_score
            + self.weights.reliability * reliability_score
            + self.weights.stability * stability_score;

        // Portfolio quality modulates the additive score: a fully Primary
        // fleet leaves it untouched, a fully Fallback fleet shaves 10%
        let modifier = 0.9 + 0.1 * (portfolio_score / 100.0);
        let mii_score = (base * modifier).clamp(0.0, 100.0);

        HealthIndexResult {
            mii_score,
            health_status: TierLevel::from_coverage(mii_score / 100.0, &self.thresholds),
            trend: overall_trend(mii_score, previous_score),
            dimensions: vec![
                dimension("coverage", coverage_score),
                dimension("reliability", reliability_score),
                dimension("stability", stability_score),
                dimension("portfolio", portfolio_score),
            ],
        }
    }
}

/// Band-based trend for a single dimension: strong scores read as
/// improving, middling as stable, weak as degrading
fn dimension(name: &str, score: f64) -> DimensionScore {
    let trend = if score >= 90.0 {
        TrendLabel::Improving
    } else if score >= 70.0 {
        TrendLabel::Stable
    } else {
        TrendLabel::Degrading
    };
    DimensionScore {
        dimension: name.to_string(),
        score,
        trend,
    }
}

fn overall_trend(current: f64, previous: Option<f64>) -> TrendLabel {
    match previous {
        None => TrendLabel::Stable,
        Some(prev) => {
            let delta = current - prev;
            if delta > TREND_TOLERANCE {
                TrendLabel::Improving
            } else if delta < -TREND_TOLERANCE {
                TrendLabel::Degrading
            } else {
                TrendLabel::Stable
            }
        }
    }
}
