use crate::indicators::{atr, ema, rate_of_change};
use crate::{ensure_len, indicator_map, propose, QuantStrategy, PRICE_DECIMALS};
use autotrader_core::instrument::round_to;
use autotrader_core::{AccountRisk, CandleSeries, Direction, EngineError, StrategyOutcome};

/// Trend following on EMA alignment and rate of change.
#[derive(Debug, Clone)]
pub struct MomentumStrategy {
    pub fast_period: usize,
    pub slow_period: usize,
    pub trend_period: usize,
    pub roc_period: usize,
    pub atr_period: usize,
    /// Minimum rate of change, in percent, before a trade is proposed
    pub min_momentum: f64,
}

impl Default for MomentumStrategy {
    fn default() -> Self {
        Self {
            fast_period: 12,
            slow_period: 26,
            trend_period: 50,
            roc_period: 10,
            atr_period: 14,
            min_momentum: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Readings {
    price: f64,
    fast: f64,
    slow: f64,
    trend: f64,
    momentum: f64,
}

impl Readings {
    /// 30 for price above trend, 30 for fast above slow, 20 for positive
    /// momentum and 20 more above 1%.
    fn bullish_score(&self) -> f64 {
        let mut score = 0.0;
        if self.price > self.trend {
            score += 30.0;
        }
        if self.fast > self.slow {
            score += 30.0;
        }
        if self.momentum > 0.0 {
            score += 20.0;
        }
        if self.momentum > 1.0 {
            score += 20.0;
        }
        score
    }

    fn bearish_score(&self) -> f64 {
        let mut score = 0.0;
        if self.price < self.trend {
            score += 30.0;
        }
        if self.fast < self.slow {
            score += 30.0;
        }
        if self.momentum < 0.0 {
            score += 20.0;
        }
        if self.momentum < -1.0 {
            score += 20.0;
        }
        score
    }
}

impl MomentumStrategy {
    pub const MIN_CANDLES: usize = 50;
    const MAX_CONFIDENCE: f64 = 95.0;
}

impl QuantStrategy for MomentumStrategy {
    fn name(&self) -> &'static str {
        "Momentum"
    }

    fn min_candles(&self) -> usize {
        Self::MIN_CANDLES
    }

    fn analyze(
        &self,
        series: &CandleSeries,
        risk: &AccountRisk,
    ) -> Result<StrategyOutcome, EngineError> {
        ensure_len(series, Self::MIN_CANDLES)?;
        let closes = series.closes();
        let r = Readings {
            price: closes[closes.len() - 1],
            fast: round_to(ema(closes, self.fast_period), PRICE_DECIMALS),
            slow: round_to(ema(closes, self.slow_period), PRICE_DECIMALS),
            trend: round_to(ema(closes, self.trend_period), PRICE_DECIMALS),
            momentum: round_to(rate_of_change(closes, self.roc_period), 2),
        };
        let atr_value = atr(series.highs(), series.lows(), closes, self.atr_period);
        let bullish = r.bullish_score();
        let bearish = r.bearish_score();

        let mut signals = Vec::new();
        if r.fast > r.slow && r.price > r.trend && r.momentum > self.min_momentum {
            signals.push(propose(
                Direction::Buy,
                r.price,
                r.slow.min(r.price - 2.0 * atr_value),
                r.price + 3.0 * atr_value,
                bullish.min(Self::MAX_CONFIDENCE),
                format!("Bullish EMA alignment, momentum {}%", r.momentum),
                risk,
            ));
        } else if r.fast < r.slow && r.price < r.trend && r.momentum < -self.min_momentum {
            signals.push(propose(
                Direction::Sell,
                r.price,
                r.slow.max(r.price + 2.0 * atr_value),
                r.price - 3.0 * atr_value,
                bearish.min(Self::MAX_CONFIDENCE),
                format!("Bearish EMA alignment, momentum {}%", r.momentum),
                risk,
            ));
        }

        Ok(StrategyOutcome::new(
            self.name(),
            r.price,
            signals,
            indicator_map([
                ("ema_fast", r.fast),
                ("ema_slow", r.slow),
                ("ema_trend", r.trend),
                ("momentum", r.momentum),
                ("trend_score", bullish),
                ("bearish_score", bearish),
                ("atr", round_to(atr_value, PRICE_DECIMALS)),
            ]),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{flat, rally_with_expansion, series, steady_decline, steady_rally};

    #[test]
    fn test_rally_buys_with_full_score() {
        let outcome = MomentumStrategy::default()
            .analyze(&rally_with_expansion(), &AccountRisk::default())
            .unwrap();
        let signal = outcome.top_signal().unwrap();
        assert_eq!(signal.direction, Direction::Buy);
        // ROC 1.53% earns every point; confidence is capped at 95
        assert!((outcome.indicators["trend_score"] - 100.0).abs() < 1e-9);
        assert!((signal.confidence - 95.0).abs() < 1e-9);
        assert!(signal.stop_loss < signal.entry);
        assert!(signal.stop_loss <= outcome.indicators["ema_slow"]);
        assert!(signal.take_profit > signal.entry);
    }

    #[test]
    fn test_slow_rally_scores_without_the_strong_momentum_bonus() {
        let outcome = MomentumStrategy::default()
            .analyze(&steady_rally(60), &AccountRisk::default())
            .unwrap();
        // ROC = 1.059 / 1.049 - 1 = 0.95%
        assert!((outcome.indicators["momentum"] - 0.95).abs() < 1e-9);
        let signal = outcome.top_signal().unwrap();
        assert!((signal.confidence - 80.0).abs() < 1e-9);
    }

    #[test]
    fn test_decline_sells_with_bearish_score() {
        let outcome = MomentumStrategy::default()
            .analyze(&steady_decline(60), &AccountRisk::default())
            .unwrap();
        let signal = outcome.top_signal().unwrap();
        assert_eq!(signal.direction, Direction::Sell);
        assert!(signal.confidence >= 80.0);
        assert!(signal.stop_loss > signal.entry);
        assert!(signal.take_profit < signal.entry);
        assert!(outcome.indicators["trend_score"] < 1e-9);
    }

    #[test]
    fn test_flat_market_waits() {
        let outcome = MomentumStrategy::default()
            .analyze(&series(flat(60, 1.1, 0.001)), &AccountRisk::default())
            .unwrap();
        assert!(!outcome.has_signal());
    }

    #[test]
    fn test_needs_fifty_candles() {
        assert!(MomentumStrategy::default()
            .analyze(&steady_rally(49), &AccountRisk::default())
            .is_err());
    }
}
