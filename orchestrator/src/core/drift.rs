//! Drift signal aggregation
//!
//! The engine never computes drift statistics itself; it consumes a list of
//! scalar signals from an external source and folds them into one number
//! plus a detected/not-detected flag.

/// Folded drift state for one run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriftSummary {
    /// Mean of the usable signals, in [0, 1]
    pub scalar: f64,
    pub detected: bool,
    /// Signals that actually contributed (finite values only)
    pub sample_count: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct DriftAggregator {
    threshold: f64,
}

impl Default for DriftAggregator {
    fn default() -> Self {
        Self { threshold: 0.10 }
    }
}

impl DriftAggregator {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Fold a signal list into one scalar. Non-finite entries are skipped,
    /// remaining entries are clamped to [0, 1] before averaging. An empty
    /// (or fully unusable) list means no drift evidence: scalar 0.0, not
    /// detected.
    pub fn aggregate(&self, signals: &[f64]) -> DriftSummary {
        let usable: Vec<f64> = signals
            .iter()
            .copied()
            .filter(|s| s.is_finite())
            .map(|s| s.clamp(0.0, 1.0))
            .collect();

        if usable.is_empty() {
            return DriftSummary {
                scalar: 0.0,
                detected: false,
                sample_count: 0,
            };
        }

        let scalar = usable.iter().sum::<f64>() / usable.len() as f64;
        DriftSummary {
            scalar,
            detected: scalar > self.threshold,
            sample_count: usable.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_signals_mean_no_drift() {
        let summary = DriftAggregator::default().aggregate(&[]);
        assert_eq!(summary.scalar, 0.0);
        assert!(!summary.detected);
        assert_eq!(summary.sample_count, 0);
    }

    #[test]
    fn test_mean_at_threshold_not_detected() {
        // 0.05 and 0.15 average to exactly 0.10 in f64
        let summary = DriftAggregator::default().aggregate(&[0.05, 0.15]);
        assert!((summary.scalar - 0.10).abs() < 1e-9);
        assert!(!summary.detected, "threshold is exclusive on the boundary");
    }

    #[test]
    fn test_mean_above_threshold_detected() {
        let summary = DriftAggregator::default().aggregate(&[0.2, 0.3]);
        assert!((summary.scalar - 0.25).abs() < 1e-9);
        assert!(summary.detected);
    }

    #[test]
    fn test_signals_are_clamped_and_nan_skipped() {
        let summary = DriftAggregator::default().aggregate(&[2.0, -1.0, f64::NAN, 0.5]);
        // 1.0, 0.0, 0.5 survive
        assert_eq!(summary.sample_count, 3);
        assert!((summary.scalar - 0.5).abs() < 1e-9);
        assert!(summary.detected);
    }

    #[test]
    fn test_custom_threshold() {
        let aggregator = DriftAggregator::new(0.5);
        assert!(!aggregator.aggregate(&[0.4]).detected);
        assert!(aggregator.aggregate(&[0.6]).detected);
    }
}
