//! Weighted vote over the four member strategies.
//!
//! Each member that fires contributes `weight × confidence` to the score of its
//! direction. The ensemble trades only when one side clears both an absolute
//! floor and the other side by a margin, so a single mildly confident member
//! never carries the vote on its own.

use crate::indicators::atr;
use crate::{
    ensure_len, indicator_map, member_strategies, propose, QuantStrategy, PRICE_DECIMALS,
};
use autotrader_core::instrument::round_to;
use autotrader_core::{
    AccountRisk, CandleSeries, Direction, EngineError, StrategyConfig, StrategyOutcome,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnsembleScores {
    pub buy: f64,
    pub sell: f64,
    pub net: f64,
}

/// One member's vote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberDetail {
    pub strategy: String,
    pub direction: Direction,
    pub confidence: f64,
    pub weighted_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleOutcome {
    pub outcome: StrategyOutcome,
    pub scores: EnsembleScores,
    pub details: Vec<MemberDetail>,
    /// Every member's own outcome, keyed by strategy name
    pub members: BTreeMap<String, StrategyOutcome>,
}

impl EnsembleOutcome {
    /// Members whose signal points the same way as `direction`.
    #[must_use]
    pub fn agreeing_members(&self, direction: Direction) -> usize {
        self.members
            .values()
            .filter_map(StrategyOutcome::top_signal)
            .filter(|s| s.direction == direction)
            .count()
    }
}

/// Decides the ensemble direction from the two weighted scores.
#[must_use]
pub fn decide(buy: f64, sell: f64, margin: f64, floor: f64) -> Direction {
    if buy > sell + margin && buy >= floor {
        Direction::Buy
    } else if sell > buy + margin && sell >= floor {
        Direction::Sell
    } else {
        Direction::Wait
    }
}

pub struct EnsembleStrategy {
    config: StrategyConfig,
    members: Vec<(Box<dyn QuantStrategy>, f64)>,
}

impl EnsembleStrategy {
    pub const NAME: &'static str = "Ensemble (Multi-Factor)";
    pub const MIN_CANDLES: usize = 50;
    const MAX_CONFIDENCE: f64 = 95.0;

    #[must_use]
    pub fn new(config: StrategyConfig) -> Self {
        let weights = [
            config.momentum_weight,
            config.mean_reversion_weight,
            config.breakout_weight,
            config.volatility_weight,
        ];
        let members = member_strategies(&config).into_iter().zip(weights).collect();
        Self { config, members }
    }

    /// Runs every member and combines their votes.
    ///
    /// # Errors
    /// [`EngineError::InsufficientData`] with fewer than 50 candles.
    pub fn evaluate(
        &self,
        series: &CandleSeries,
        risk: &AccountRisk,
    ) -> Result<EnsembleOutcome, EngineError> {
        ensure_len(series, Self::MIN_CANDLES)?;
        let closes = series.closes();
        let price = closes[closes.len() - 1];

        let mut members = BTreeMap::new();
        let mut details = Vec::new();
        let (mut buy, mut sell) = (0.0, 0.0);

        for (strategy, weight) in &self.members {
            let outcome = match strategy.analyze(series, risk) {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::debug!(strategy = strategy.name(), error = %e, "Member skipped");
                    continue;
                }
            };
            if let Some(signal) = outcome.top_signal() {
                let weighted = weight * signal.confidence;
                match signal.direction {
                    Direction::Buy => buy += weighted,
                    Direction::Sell => sell += weighted,
                    Direction::Wait => {}
                }
                details.push(MemberDetail {
                    strategy: strategy.name().to_string(),
                    direction: signal.direction,
                    confidence: signal.confidence,
                    weighted_score: round_to(weighted, 1),
                });
            }
            members.insert(strategy.name().to_string(), outcome);
        }

        let scores = EnsembleScores {
            buy: round_to(buy, 1),
            sell: round_to(sell, 1),
            net: round_to(buy - sell, 1),
        };
        let atr_value = atr(series.highs(), series.lows(), closes, 14);
        let direction = decide(
            buy,
            sell,
            self.config.ensemble_margin,
            self.config.ensemble_floor,
        );

        let signals = match direction {
            Direction::Wait => Vec::new(),
            direction => {
                let score = if direction == Direction::Buy { buy } else { sell };
                let sign = if direction == Direction::Buy { 1.0 } else { -1.0 };
                let voters = details.iter().filter(|d| d.direction == direction).count();
                vec![propose(
                    direction,
                    price,
                    price - sign * self.config.ensemble_stop_atr * atr_value,
                    price + sign * self.config.ensemble_target_atr * atr_value,
                    round_to(score.min(Self::MAX_CONFIDENCE), 1),
                    format!(
                        "{voters} of {} strategies favour {direction} (score {})",
                        self.members.len(),
                        round_to(score, 1)
                    ),
                    risk,
                )]
            }
        };

        tracing::debug!(
            buy = scores.buy,
            sell = scores.sell,
            direction = %direction,
            "Ensemble vote"
        );

        Ok(EnsembleOutcome {
            outcome: StrategyOutcome::new(
                Self::NAME,
                price,
                signals,
                indicator_map([
                    ("buy_score", scores.buy),
                    ("sell_score", scores.sell),
                    ("net_score", scores.net),
                    ("atr", round_to(atr_value, PRICE_DECIMALS)),
                ]),
            ),
            scores,
            details,
            members,
        })
    }
}

impl QuantStrategy for EnsembleStrategy {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn min_candles(&self) -> usize {
        Self::MIN_CANDLES
    }

    fn analyze(
        &self,
        series: &CandleSeries,
        risk: &AccountRisk,
    ) -> Result<StrategyOutcome, EngineError> {
        self.evaluate(series, risk).map(|e| e.outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{rally_with_expansion, steady_rally};
    use proptest::prelude::*;

    #[test]
    fn test_agreeing_members_outvote_a_dissenter() {
        let ensemble = EnsembleStrategy::new(StrategyConfig::default());
        let result = ensemble
            .evaluate(&rally_with_expansion(), &AccountRisk::default())
            .unwrap();

        // Momentum 0.30 × 95 + Volatility 0.20 × 85 against Mean Reversion 0.25 × 80
        assert!((result.scores.buy - 45.5).abs() < 1e-9);
        assert!((result.scores.sell - 20.0).abs() < 1e-9);
        assert!((result.scores.net - 25.5).abs() < 1e-9);

        let signal = result.outcome.top_signal().unwrap();
        assert_eq!(signal.direction, Direction::Buy);
        assert!((signal.confidence - 45.5).abs() < 1e-9);
        assert!((signal.risk_reward - 1.5).abs() < 1e-9);
        assert_eq!(result.outcome.strategy, EnsembleStrategy::NAME);

        assert_eq!(result.details.len(), 3);
        assert!(result
            .details
            .iter()
            .any(|d| d.strategy == "Mean Reversion" && d.direction == Direction::Sell));
        assert_eq!(result.members.len(), 4);
        assert_eq!(result.agreeing_members(Direction::Buy), 2);
    }

    #[test]
    fn test_single_member_cannot_carry_the_vote() {
        let ensemble = EnsembleStrategy::new(StrategyConfig::default());
        let result = ensemble
            .evaluate(&steady_rally(60), &AccountRisk::default())
            .unwrap();
        // Momentum alone: 0.30 × 80 = 24 < 40
        assert!((result.scores.buy - 24.0).abs() < 1e-9);
        assert!(!result.outcome.has_signal());
    }

    #[test]
    fn test_weights_come_from_config() {
        let config = StrategyConfig {
            momentum_weight: 1.0,
            ..StrategyConfig::default()
        };
        let result = EnsembleStrategy::new(config)
            .evaluate(&steady_rally(60), &AccountRisk::default())
            .unwrap();
        assert!((result.scores.buy - 80.0).abs() < 1e-9);
        assert!((result.outcome.top_signal().unwrap().confidence - 80.0).abs() < 1e-9);
    }

    #[test]
    fn test_needs_fifty_candles() {
        let ensemble = EnsembleStrategy::new(StrategyConfig::default());
        assert!(matches!(
            ensemble.evaluate(&steady_rally(49), &AccountRisk::default()),
            Err(EngineError::InsufficientData { required: 50, .. })
        ));
    }

    #[test]
    fn test_decide_boundaries() {
        assert_eq!(decide(40.0, 0.0, 20.0, 40.0), Direction::Buy);
        assert_eq!(decide(39.9, 0.0, 20.0, 40.0), Direction::Wait);
        assert_eq!(decide(60.0, 40.0, 20.0, 40.0), Direction::Wait);
        assert_eq!(decide(20.0, 60.1, 20.0, 40.0), Direction::Sell);
    }

    proptest! {
        #[test]
        fn prop_decision_respects_margin_and_floor(
            buy in 0.0f64..100.0,
            sell in 0.0f64..100.0,
        ) {
            match decide(buy, sell, 20.0, 40.0) {
                Direction::Buy => prop_assert!(buy > sell + 20.0 && buy >= 40.0),
                Direction::Sell => prop_assert!(sell > buy + 20.0 && sell >= 40.0),
                Direction::Wait => prop_assert!(
                    !(buy > sell + 20.0 && buy >= 40.0) && !(sell > buy + 20.0 && sell >= 40.0)
                ),
            }
        }
    }
}
