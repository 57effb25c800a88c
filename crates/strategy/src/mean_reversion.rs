use crate::indicators::{atr, bollinger, rsi};
use crate::{ensure_len, indicator_map, propose, QuantStrategy, PRICE_DECIMALS};
use autotrader_core::instrument::round_to;
use autotrader_core::{AccountRisk, CandleSeries, Direction, EngineError, StrategyOutcome};

/// Fades closes outside the Bollinger Bands when RSI confirms the extreme.
///
/// BUY below the lower band with RSI under `oversold`, SELL above the upper band
/// with RSI over `overbought`. The target is the middle band and the stop sits
/// two ATRs beyond entry.
#[derive(Debug, Clone)]
pub struct MeanReversionStrategy {
    pub oversold: f64,
    pub overbought: f64,
    pub bb_period: usize,
    pub bb_width: f64,
    pub rsi_period: usize,
    pub atr_period: usize,
}

impl MeanReversionStrategy {
    pub const MIN_CANDLES: usize = 30;
    const MAX_CONFIDENCE: f64 = 90.0;

    #[must_use]
    pub fn new(oversold: f64, overbought: f64) -> Self {
        Self {
            oversold,
            overbought,
            ..Self::default()
        }
    }
}

impl Default for MeanReversionStrategy {
    fn default() -> Self {
        Self {
            oversold: 30.0,
            overbought: 70.0,
            bb_period: 20,
            bb_width: 2.0,
            rsi_period: 14,
            atr_period: 14,
        }
    }
}

impl QuantStrategy for MeanReversionStrategy {
    fn name(&self) -> &'static str {
        "Mean Reversion"
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
        let price = closes[closes.len() - 1];

        let bands = bollinger(closes, self.bb_period, self.bb_width).ok_or(
            EngineError::InsufficientData {
                required: self.bb_period,
                actual: closes.len(),
            },
        )?;
        let (upper, middle, lower) = (
            round_to(bands.upper, PRICE_DECIMALS),
            round_to(bands.middle, PRICE_DECIMALS),
            round_to(bands.lower, PRICE_DECIMALS),
        );
        let rsi_value = round_to(rsi(closes, self.rsi_period), 2);
        let atr_value = atr(series.highs(), series.lows(), closes, self.atr_period);

        let mut signals = Vec::new();
        if price < lower && rsi_value < self.oversold {
            signals.push(propose(
                Direction::Buy,
                price,
                price - 2.0 * atr_value,
                middle,
                (50.0 + (self.oversold - rsi_value)).min(Self::MAX_CONFIDENCE),
                format!("Price below lower band, RSI oversold ({rsi_value})"),
                risk,
            ));
        } else if price > upper && rsi_value > self.overbought {
            signals.push(propose(
                Direction::Sell,
                price,
                price + 2.0 * atr_value,
                middle,
                (50.0 + (rsi_value - self.overbought)).min(Self::MAX_CONFIDENCE),
                format!("Price above upper band, RSI overbought ({rsi_value})"),
                risk,
            ));
        }

        Ok(StrategyOutcome::new(
            self.name(),
            price,
            signals,
            indicator_map([
                ("bb_upper", upper),
                ("bb_middle", middle),
                ("bb_lower", lower),
                ("rsi", rsi_value),
                ("atr", round_to(atr_value, PRICE_DECIMALS)),
            ]),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{flat, series};
    use autotrader_core::{Candle, OutcomeStatus};

    fn spike(last_close: f64) -> CandleSeries {
        let mut candles = flat(39, 1.1, 0.0005);
        let (high, low) = if last_close < 1.1 {
            (1.1005, last_close - 0.0005)
        } else {
            (last_close + 0.0005, 1.0995)
        };
        candles.push(Candle::new(1.1, high, low, last_close));
        series(candles)
    }

    #[test]
    fn test_oversold_drop_buys_back_to_the_middle_band() {
        let outcome = MeanReversionStrategy::default()
            .analyze(&spike(1.09), &AccountRisk::default())
            .unwrap();

        let signal = outcome.top_signal().unwrap();
        assert_eq!(signal.direction, Direction::Buy);
        assert!((signal.take_profit - 1.0995).abs() < 1e-9);
        // ATR = (13 × 0.001 + 0.011) / 14
        assert!((signal.stop_loss - 1.08657).abs() < 1e-9);
        // RSI is 0 after a single loss: 50 + 30, capped at 90
        assert!((signal.confidence - 80.0).abs() < 1e-9);
        assert!((signal.risk_reward - 2.77).abs() < 1e-9);
        assert!((signal.lots - 0.29).abs() < 1e-9);
        assert!(outcome.indicators["rsi"].abs() < 1e-9);
    }

    #[test]
    fn test_overbought_spike_sells() {
        let outcome = MeanReversionStrategy::default()
            .analyze(&spike(1.11), &AccountRisk::default())
            .unwrap();
        let signal = outcome.top_signal().unwrap();
        assert_eq!(signal.direction, Direction::Sell);
        assert!((signal.take_profit - 1.1005).abs() < 1e-9);
        assert!(signal.stop_loss > signal.entry);
    }

    #[test]
    fn test_quiet_market_has_no_signal() {
        let outcome = MeanReversionStrategy::default()
            .analyze(&series(flat(40, 1.1, 0.0005)), &AccountRisk::default())
            .unwrap();
        assert_eq!(outcome.status, OutcomeStatus::NoSignal);
        // no losses at all reads as RSI 100, but price sits on the collapsed bands
        assert!((outcome.indicators["rsi"] - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_thresholds_are_configurable() {
        // RSI 0 is still not below an oversold level of 0
        let strategy = MeanReversionStrategy::new(0.0, 100.0);
        let outcome = strategy
            .analyze(&spike(1.09), &AccountRisk::default())
            .unwrap();
        assert!(!outcome.has_signal());
    }

    #[test]
    fn test_short_series_is_rejected() {
        let err = MeanReversionStrategy::default()
            .analyze(&series(flat(29, 1.1, 0.0005)), &AccountRisk::default())
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::InsufficientData {
                required: 30,
                actual: 29
            }
        ));
    }
}
