//! Confidence scoring.
//!
//! Combines the model's raw certainty signal, the top retrieval relevance,
//! and the project's historical acceptance rate into a single bounded
//! confidence value:
//!
//! ```text
//! confidence = w1·raw_signal + w2·relevance_top1 + w3·prior
//! prior      = (accepted + α) / (total + α + β)
//! ```
//!
//! The prior is a Beta-smoothed acceptance rate; α and β keep it defined
//! and moderate on sparse history. When the provider exposes no certainty
//! signal, `w1` is redistributed proportionally across `w2` and `w3`.
//!
//! Scoring is deterministic given its inputs — no hidden randomness — so
//! gate decisions are reproducible and testable.

use serde::{Deserialize, Serialize};

use crate::models::AcceptanceStats;

/// Weights for the three confidence components. Deployment configuration,
/// not learned online; must sum to 1.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScoreWeights {
    /// Weight of the provider's raw certainty signal.
    pub signal: f64,
    /// Weight of the top-1 retrieval relevance.
    pub relevance: f64,
    /// Weight of the historical acceptance prior.
    pub prior: f64,
}

impl ScoreWeights {
    /// True when all weights are non-negative and sum to 1 (within epsilon).
    pub fn is_valid(&self) -> bool {
        self.signal >= 0.0
            && self.relevance >= 0.0
            && self.prior >= 0.0
            && (self.signal + self.relevance + self.prior - 1.0).abs() < 1e-6
    }
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            signal: 0.5,
            relevance: 0.3,
            prior: 0.2,
        }
    }
}

/// Beta smoothing constants for the acceptance prior.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PriorSmoothing {
    pub alpha: f64,
    pub beta: f64,
}

impl Default for PriorSmoothing {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            beta: 1.0,
        }
    }
}

/// Beta-smoothed historical acceptance rate in `(0, 1)`.
///
/// With no history this is `α / (α + β)` — an uninformed 0.5 at the
/// default smoothing — rather than a divide-by-zero or an overconfident
/// extreme after one observation.
pub fn acceptance_prior(stats: &AcceptanceStats, smoothing: &PriorSmoothing) -> f64 {
    let resolved = (stats.total_accepted + stats.total_rejected) as f64;
    let accepted = stats.total_accepted as f64;
    (accepted + smoothing.alpha) / (resolved + smoothing.alpha + smoothing.beta)
}

/// Compute the confidence for one suggestion.
///
/// `raw_signal` is the provider's certainty in `[0, 1]`, or `None` when the
/// provider exposes none. `relevance_top1` is the best retrieval relevance,
/// 0.0 for an empty retrieval. Inputs are clamped defensively; the result
/// is always in `[0, 1]` and monotone non-decreasing in `raw_signal`.
pub fn score(
    raw_signal: Option<f64>,
    relevance_top1: f64,
    stats: &AcceptanceStats,
    weights: &ScoreWeights,
    smoothing: &PriorSmoothing,
) -> f64 {
    let relevance = relevance_top1.clamp(0.0, 1.0);
    let prior = acceptance_prior(stats, smoothing);

    let value = match raw_signal {
        Some(signal) => {
            let signal = signal.clamp(0.0, 1.0);
            weights.signal * signal + weights.relevance * relevance + weights.prior * prior
        }
        None => {
            // Redistribute w1 proportionally over w2 and w3.
            let rest = weights.relevance + weights.prior;
            if rest <= f64::EPSILON {
                // Degenerate weighting: everything rode on the signal.
                prior
            } else {
                let w_rel = weights.relevance / rest;
                let w_prior = weights.prior / rest;
                w_rel * relevance + w_prior * prior
            }
        }
    };

    value.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(accepted: i64, rejected: i64) -> AcceptanceStats {
        AcceptanceStats {
            total_suggested: accepted + rejected,
            total_accepted: accepted,
            total_rejected: rejected,
        }
    }

    #[test]
    fn test_score_bounded_over_input_grid() {
        let weights = ScoreWeights::default();
        let smoothing = PriorSmoothing::default();
        for s in 0..=10 {
            for r in 0..=10 {
                for a in [0i64, 1, 5, 100] {
                    for d in [0i64, 1, 5, 100] {
                        let v = score(
                            Some(s as f64 / 10.0),
                            r as f64 / 10.0,
                            &stats(a, d),
                            &weights,
                            &smoothing,
                        );
                        assert!((0.0..=1.0).contains(&v), "out of range: {}", v);
                    }
                }
            }
        }
    }

    #[test]
    fn test_monotone_in_raw_signal() {
        let weights = ScoreWeights::default();
        let smoothing = PriorSmoothing::default();
        let st = stats(3, 2);
        let mut prev = -1.0;
        for s in 0..=20 {
            let v = score(Some(s as f64 / 20.0), 0.7, &st, &weights, &smoothing);
            assert!(v >= prev, "confidence decreased as raw_signal increased");
            prev = v;
        }
    }

    #[test]
    fn test_deterministic() {
        let weights = ScoreWeights::default();
        let smoothing = PriorSmoothing::default();
        let st = stats(10, 4);
        let a = score(Some(0.8), 0.6, &st, &weights, &smoothing);
        let b = score(Some(0.8), 0.6, &st, &weights, &smoothing);
        assert_eq!(a, b);
    }

    #[test]
    fn test_prior_smoothing_no_history() {
        let p = acceptance_prior(&stats(0, 0), &PriorSmoothing::default());
        assert!((p - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_prior_avoids_extremes_on_sparse_history() {
        let smoothing = PriorSmoothing::default();
        // One accepted, nothing rejected: smoothed below certainty.
        let p = acceptance_prior(&stats(1, 0), &smoothing);
        assert!(p < 1.0);
        assert!(p > 0.5);
        // One rejected, nothing accepted: smoothed above zero.
        let p = acceptance_prior(&stats(0, 1), &smoothing);
        assert!(p > 0.0);
        assert!(p < 0.5);
    }

    #[test]
    fn test_null_signal_redistributes_weights() {
        let weights = ScoreWeights {
            signal: 0.5,
            relevance: 0.3,
            prior: 0.2,
        };
        let smoothing = PriorSmoothing::default();
        let st = stats(0, 0); // prior = 0.5

        // With w1 gone, relevance weight becomes 0.3/0.5 = 0.6 and prior
        // weight 0.2/0.5 = 0.4.
        let v = score(None, 1.0, &st, &weights, &smoothing);
        assert!((v - (0.6 * 1.0 + 0.4 * 0.5)).abs() < 1e-9);
    }

    #[test]
    fn test_null_signal_degenerate_weights_fall_back_to_prior() {
        let weights = ScoreWeights {
            signal: 1.0,
            relevance: 0.0,
            prior: 0.0,
        };
        let v = score(None, 0.9, &stats(4, 0), &weights, &PriorSmoothing::default());
        let p = acceptance_prior(&stats(4, 0), &PriorSmoothing::default());
        assert!((v - p).abs() < 1e-9);
    }

    #[test]
    fn test_empty_retrieval_zeroes_relevance_term() {
        let weights = ScoreWeights::default();
        let smoothing = PriorSmoothing::default();
        let st = stats(0, 0);
        let with = score(Some(0.9), 0.8, &st, &weights, &smoothing);
        let without = score(Some(0.9), 0.0, &st, &weights, &smoothing);
        assert!(without < with);
        assert!((with - without - weights.relevance * 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_weights_validation() {
        assert!(ScoreWeights::default().is_valid());
        assert!(!ScoreWeights {
            signal: 0.5,
            relevance: 0.5,
            prior: 0.5,
        }
        .is_valid());
        assert!(!ScoreWeights {
            signal: -0.2,
            relevance: 0.7,
            prior: 0.5,
        }
        .is_valid());
    }

    #[test]
    fn test_out_of_range_inputs_clamped() {
        let weights = ScoreWeights::default();
        let smoothing = PriorSmoothing::default();
        let st = stats(1, 1);
        let v = score(Some(7.5), 42.0, &st, &weights, &smoothing);
        assert!((0.0..=1.0).contains(&v));
        let v = score(Some(-3.0), -1.0, &st, &weights, &smoothing);
        assert!((0.0..=1.0).contains(&v));
    }
}
