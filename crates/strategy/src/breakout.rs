use crate::indicators::{atr, swing_points};
use crate::{ensure_len, indicator_map, propose, QuantStrategy, PRICE_DECIMALS};
use autotrader_core::instrument::round_to;
use autotrader_core::{AccountRisk, CandleSeries, Direction, EngineError, StrategyOutcome};

/// Trades the first close through recent swing resistance or support.
///
/// Levels come from the last three swing points inside the lookback window,
/// falling back to the window's extreme when there are none. A break only counts
/// if the four bars before the current one stayed on the near side of the level.
#[derive(Debug, Clone)]
pub struct BreakoutStrategy {
    pub lookback: usize,
    /// Bars each side a swing point must dominate
    pub swing_radius: usize,
    pub atr_period: usize,
    pub confidence: f64,
}

impl Default for BreakoutStrategy {
    fn default() -> Self {
        Self {
            lookback: 20,
            swing_radius: 2,
            atr_period: 14,
            confidence: 75.0,
        }
    }
}

impl BreakoutStrategy {
    pub const MIN_CANDLES: usize = 30;
    const CONFIRM_BARS: usize = 4;
    const LEVEL_SWINGS: usize = 3;

    /// (resistance, support) over the trailing `lookback` bars.
    fn levels(&self, highs: &[f64], lows: &[f64]) -> (f64, f64) {
        let start = highs.len().saturating_sub(self.lookback);
        let (recent_highs, recent_lows) = (&highs[start..], &lows[start..]);
        let swings = swing_points(recent_highs, recent_lows, self.swing_radius);

        let resistance = if swings.highs.is_empty() {
            recent_highs.iter().copied().fold(f64::MIN, f64::max)
        } else {
            swings
                .highs
                .iter()
                .rev()
                .take(Self::LEVEL_SWINGS)
                .map(|p| p.price)
                .fold(f64::MIN, f64::max)
        };
        let support = if swings.lows.is_empty() {
            recent_lows.iter().copied().fold(f64::MAX, f64::min)
        } else {
            swings
                .lows
                .iter()
                .rev()
                .take(Self::LEVEL_SWINGS)
                .map(|p| p.price)
                .fold(f64::MAX, f64::min)
        };
        (resistance, support)
    }
}

impl QuantStrategy for BreakoutStrategy {
    fn name(&self) -> &'static str {
        "Breakout"
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
        let (highs, lows, closes) = (series.highs(), series.lows(), series.closes());
        let n = closes.len();
        let price = closes[n - 1];
        let atr_value = atr(highs, lows, closes, self.atr_period);

        let (resistance, support) = self.levels(highs, lows);
        let confirm = n - 1 - Self::CONFIRM_BARS..n - 1;
        let prev_high = highs[confirm.clone()]
            .iter()
            .copied()
            .fold(f64::MIN, f64::max);
        let prev_low = lows[confirm].iter().copied().fold(f64::MAX, f64::min);

        let mut signals = Vec::new();
        if price > resistance && prev_high < resistance {
            signals.push(propose(
                Direction::Buy,
                price,
                resistance - 1.5 * atr_value,
                price + 3.0 * atr_value,
                self.confidence,
                format!("Bullish breakout above {}", round_to(resistance, PRICE_DECIMALS)),
                risk,
            ));
        } else if price < support && prev_low > support {
            signals.push(propose(
                Direction::Sell,
                price,
                support + 1.5 * atr_value,
                price - 3.0 * atr_value,
                self.confidence,
                format!("Bearish breakdown below {}", round_to(support, PRICE_DECIMALS)),
                risk,
            ));
        }

        Ok(StrategyOutcome::new(
            self.name(),
            price,
            signals,
            indicator_map([
                ("resistance", round_to(resistance, PRICE_DECIMALS)),
                ("support", round_to(support, PRICE_DECIMALS)),
                ("atr", round_to(atr_value, PRICE_DECIMALS)),
            ]),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{flat, series, steady_rally};
    use autotrader_core::Candle;

    /// Flat range with one swing high at 1.1050 ten bars back, then `last`.
    fn range_with_swing_high(last: Candle, spoiler_high: Option<f64>) -> CandleSeries {
        let mut candles = flat(39, 1.1, 0.001);
        candles[30] = Candle::new(1.1, 1.105, 1.099, 1.1);
        if let Some(high) = spoiler_high {
            candles[37] = Candle::new(1.1, high, 1.099, 1.1);
        }
        candles.push(last);
        series(candles)
    }

    #[test]
    fn test_close_through_swing_high_buys() {
        let outcome = BreakoutStrategy::default()
            .analyze(
                &range_with_swing_high(Candle::new(1.1, 1.1085, 1.0995, 1.108), None),
                &AccountRisk::default(),
            )
            .unwrap();

        assert!((outcome.indicators["resistance"] - 1.105).abs() < 1e-9);
        assert!((outcome.indicators["support"] - 1.099).abs() < 1e-9);
        let signal = outcome.top_signal().unwrap();
        assert_eq!(signal.direction, Direction::Buy);
        assert!((signal.confidence - 75.0).abs() < 1e-9);
        // ATR = (12 × 0.002 + 0.006 + 0.009) / 14
        assert!((signal.stop_loss - 1.10082).abs() < 1e-9);
        assert!((signal.take_profit - 1.11636).abs() < 1e-9);
    }

    #[test]
    fn test_level_already_tested_is_not_a_breakout() {
        let outcome = BreakoutStrategy::default()
            .analyze(
                &range_with_swing_high(Candle::new(1.1, 1.1085, 1.0995, 1.108), Some(1.106)),
                &AccountRisk::default(),
            )
            .unwrap();
        assert!(!outcome.has_signal());
    }

    #[test]
    fn test_breakdown_without_swings_uses_window_low() {
        let mut candles = flat(39, 1.1, 0.001);
        candles.push(Candle::new(1.1, 1.1005, 1.0915, 1.092));
        let outcome = BreakoutStrategy::default()
            .analyze(&series(candles), &AccountRisk::default())
            .unwrap();
        // the current bar's own low is part of the window, so no close can be below it
        assert!((outcome.indicators["support"] - 1.0915).abs() < 1e-9);
        assert!(!outcome.has_signal());
    }

    #[test]
    fn test_trend_without_swings_has_no_breakout() {
        let outcome = BreakoutStrategy::default()
            .analyze(&steady_rally(40), &AccountRisk::default())
            .unwrap();
        assert!(!outcome.has_signal());
    }

    #[test]
    fn test_needs_thirty_candles() {
        assert!(BreakoutStrategy::default()
            .analyze(&series(flat(29, 1.1, 0.001)), &AccountRisk::default())
            .is_err());
    }
}
