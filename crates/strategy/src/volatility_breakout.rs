use crate::indicators::{atr, average_range};
use crate::{ensure_len, indicator_map, propose, QuantStrategy, PRICE_DECIMALS};
use autotrader_core::instrument::round_to;
use autotrader_core::{AccountRisk, CandleSeries, Direction, EngineError, StrategyOutcome};

/// Range expansion away from the bar's open.
#[derive(Debug, Clone)]
pub struct VolatilityBreakoutStrategy {
    pub range_period: usize,
    /// Fraction of the average range the close must travel from the open
    pub trigger_fraction: f64,
    /// Current range over average range required to trade
    pub min_expansion: f64,
    pub atr_period: usize,
}

impl Default for VolatilityBreakoutStrategy {
    fn default() -> Self {
        Self {
            range_period: 10,
            trigger_fraction: 0.7,
            min_expansion: 1.2,
            atr_period: 14,
        }
    }
}

impl VolatilityBreakoutStrategy {
    pub const MIN_CANDLES: usize = 20;
    const MAX_CONFIDENCE: f64 = 85.0;

    fn confidence(expansion: f64) -> f64 {
        (60.0 + (expansion - 1.0) * 20.0).min(Self::MAX_CONFIDENCE)
    }
}

impl QuantStrategy for VolatilityBreakoutStrategy {
    fn name(&self) -> &'static str {
        "Volatility Breakout"
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
        let open = series.opens()[n - 1];

        let avg_range = average_range(highs, lows, self.range_period).unwrap_or(0.0);
        let current_range = highs[n - 1] - lows[n - 1];
        let expansion = if avg_range > 0.0 {
            current_range / avg_range
        } else {
            1.0
        };
        let upper = open + avg_range * self.trigger_fraction;
        let lower = open - avg_range * self.trigger_fraction;
        let atr_value = atr(highs, lows, closes, self.atr_period);

        let mut signals = Vec::new();
        if expansion > self.min_expansion {
            if price > upper {
                signals.push(propose(
                    Direction::Buy,
                    price,
                    open,
                    price + 1.5 * atr_value,
                    Self::confidence(expansion),
                    format!("Upside range expansion {:.2}x", expansion),
                    risk,
                ));
            } else if price < lower {
                signals.push(propose(
                    Direction::Sell,
                    price,
                    open,
                    price - 1.5 * atr_value,
                    Self::confidence(expansion),
                    format!("Downside range expansion {:.2}x", expansion),
                    risk,
                ));
            }
        }

        Ok(StrategyOutcome::new(
            self.name(),
            price,
            signals,
            indicator_map([
                ("upper_trigger", round_to(upper, PRICE_DECIMALS)),
                ("lower_trigger", round_to(lower, PRICE_DECIMALS)),
                ("avg_range", round_to(avg_range, PRICE_DECIMALS)),
                ("expansion", round_to(expansion, 2)),
                ("atr", round_to(atr_value, PRICE_DECIMALS)),
            ]),
        ))
    }
}
