use crate::ensemble::EnsembleOutcome;
use autotrader_core::instrument::round_to;
use autotrader_core::{ScoringConfig, Signal};
use serde::{Deserialize, Serialize};

/// Heuristic execution probability with its components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionScore {
    /// 0-100, 1 dp
    pub probability: f64,
    pub rationale: String,
    pub agreement: f64,
    pub risk_reward: f64,
    pub confidence: f64,
}

impl ExecutionScore {
    fn none() -> Self {
        Self {
            probability: 0.0,
            rationale: "No valid signals".to_string(),
            agreement: 0.0,
            risk_reward: 0.0,
            confidence: 0.0,
        }
    }
}

/// Scores a proposal from member agreement, reward-to-risk and confidence.
///
/// `probability = agreement + rr + confidence + baseline`, clamped to
/// `[min_probability, max_probability]`. Agreement is worth
/// `agreement_points` per member strategy proposing the same direction, up to
/// `agreement_cap`.
#[derive(Debug, Clone, Default)]
pub struct ExecutionScorer {
    config: ScoringConfig,
}

impl ExecutionScorer {
    #[must_use]
    pub const fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    /// Scores the ensemble's proposal against its members.
    #[must_use]
    pub fn score(&self, ensemble: &EnsembleOutcome) -> ExecutionScore {
        match ensemble.outcome.top_signal() {
            None => ExecutionScore::none(),
            Some(signal) => {
                self.score_signal(signal, ensemble.agreeing_members(signal.direction))
            }
        }
    }

    /// Scores `signal` given how many independent strategies agree with it.
    #[must_use]
    pub fn score_signal(&self, signal: &Signal, agreeing: usize) -> ExecutionScore {
        let c = &self.config;

        #[allow(clippy::cast_precision_loss)]
        let agreement = (agreeing as f64 * c.agreement_points).min(c.agreement_cap);
        let risk_reward = if signal.risk_reward > 0.0 {
            (signal.risk_reward * c.risk_reward_multiplier).min(c.risk_reward_cap)
        } else {
            0.0
        };
        let confidence = signal.confidence * c.confidence_weight;

        let probability = round_to(
            (agreement + risk_reward + confidence + c.volatility_baseline)
                .clamp(c.min_probability, c.max_probability),
            1,
        );

        let mut reasons = Vec::new();
        if agreement >= c.strong_agreement {
            reasons.push("Strong strategy agreement".to_string());
        }
        if signal.risk_reward >= c.good_risk_reward {
            reasons.push(format!("Good R:R ({}:1)", signal.risk_reward));
        }
        if signal.confidence >= c.high_confidence {
            reasons.push("High confidence signal".to_string());
        }
        let rationale = if reasons.is_empty() {
            "Moderate signal strength".to_string()
        } else {
            reasons.join(", ")
        };

        ExecutionScore {
            probability,
            rationale,
            agreement,
            risk_reward,
            confidence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ensemble::EnsembleStrategy;
    use crate::fixtures::{rally_with_expansion, steady_rally};
    use autotrader_core::{AccountRisk, Direction, StrategyConfig};
    use proptest::prelude::*;

    fn signal(confidence: f64, risk_reward: f64) -> Signal {
        Signal {
            direction: Direction::Buy,
            entry: 1.1,
            stop_loss: 1.09,
            take_profit: 1.12,
            lots: 0.1,
            confidence,
            risk_reward,
            reason: String::new(),
        }
    }

    #[test]
    fn test_components_add_up() {
        let scorer = ExecutionScorer::default();
        // 15 + min(20, 1.5 × 8) + 0.4 × 60 + 10
        let score = scorer.score_signal(&signal(60.0, 1.5), 1);
        assert!((score.probability - 61.0).abs() < 1e-9);
        assert_eq!(score.rationale, "Moderate signal strength");
    }

    #[test]
    fn test_caps_and_reasons() {
        let scorer = ExecutionScorer::default();
        let score = scorer.score_signal(&signal(90.0, 3.0), 4);
        assert!((score.agreement - 30.0).abs() < 1e-9);
        assert!((score.risk_reward - 20.0).abs() < 1e-9);
        // 30 + 20 + 36 + 10 = 96, clamped
        assert!((score.probability - 95.0).abs() < 1e-9);
        assert_eq!(
            score.rationale,
            "Strong strategy agreement, Good R:R (3:1), High confidence signal"
        );
    }

    #[test]
    fn test_floor_applies_without_baseline() {
        let scorer = ExecutionScorer::new(ScoringConfig {
            volatility_baseline: 0.0,
            ..ScoringConfig::default()
        });
        let score = scorer.score_signal(&signal(5.0, 0.0), 0);
        assert!((score.probability - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_scores_ensemble_against_agreeing_members() {
        let ensemble = EnsembleStrategy::new(StrategyConfig::default())
            .evaluate(&rally_with_expansion(), &AccountRisk::default())
            .unwrap();
        let score = ExecutionScorer::default().score(&ensemble);
        // two agreeing members 30, rr 1.5 → 12, 0.4 × 45.5 = 18.2, baseline 10
        assert!((score.probability - 70.2).abs() < 1e-9);
        assert_eq!(score.rationale, "Strong strategy agreement");
    }

    #[test]
    fn test_no_signal_scores_zero() {
        let ensemble = EnsembleStrategy::new(StrategyConfig::default())
            .evaluate(&steady_rally(60), &AccountRisk::default())
            .unwrap();
        let score = ExecutionScorer::default().score(&ensemble);
        assert!(score.probability.abs() < 1e-9);
        assert_eq!(score.rationale, "No valid signals");
    }

    proptest! {
        #[test]
        fn prop_probability_stays_in_band(
            confidence in 0.0f64..100.0,
            risk_reward in -5.0f64..10.0,
            agreeing in 0usize..6,
        ) {
            let score = ExecutionScorer::default()
                .score_signal(&signal(confidence, risk_reward), agreeing);
            prop_assert!((5.0..=95.0).contains(&score.probability));
        }
    }
}
