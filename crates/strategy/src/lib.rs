pub mod breakout;
pub mod ensemble;
pub mod indicators;
pub mod mean_reversion;
pub mod momentum;
pub mod pairs;
pub mod providers;
pub mod scoring;
pub mod volatility_breakout;

pub use breakout::BreakoutStrategy;
pub use ensemble::{EnsembleOutcome, EnsembleScores, EnsembleStrategy, MemberDetail};
pub use mean_reversion::MeanReversionStrategy;
pub use momentum::MomentumStrategy;
pub use pairs::{analyze_pair, PairsOutcome, PairsTrade};
pub use providers::{EnsembleProvider, HybridProvider, ProviderRegistry, UnavailableProvider};
pub use scoring::{ExecutionScore, ExecutionScorer};
pub use volatility_breakout::VolatilityBreakoutStrategy;

use autotrader_core::instrument::round_to;
use autotrader_core::{
    calculate_lot_size, risk_reward, AccountRisk, CandleSeries, Direction, EngineError, Signal,
    StrategyOutcome, StrategyConfig,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Decimals used for signal prices and indicator values.
pub const PRICE_DECIMALS: u32 = 5;

/// A stateless rule set that reads a candle series and proposes zero or one trade.
pub trait QuantStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Shortest series the strategy accepts.
    fn min_candles(&self) -> usize;

    /// # Errors
    /// [`EngineError::InsufficientData`] when `series` is shorter than
    /// [`QuantStrategy::min_candles`].
    fn analyze(
        &self,
        series: &CandleSeries,
        risk: &AccountRisk,
    ) -> Result<StrategyOutcome, EngineError>;
}

pub(crate) fn ensure_len(series: &CandleSeries, required: usize) -> Result<(), EngineError> {
    if series.len() < required {
        return Err(EngineError::InsufficientData {
            required,
            actual: series.len(),
        });
    }
    Ok(())
}

/// Builds a signal with prices rounded to [`PRICE_DECIMALS`], lots sized from the
/// account risk and reward-to-risk taken from the unrounded levels.
pub(crate) fn propose(
    direction: Direction,
    entry: f64,
    stop_loss: f64,
    take_profit: f64,
    confidence: f64,
    reason: impl Into<String>,
    risk: &AccountRisk,
) -> Signal {
    Signal {
        direction,
        entry: round_to(entry, PRICE_DECIMALS),
        stop_loss: round_to(stop_loss, PRICE_DECIMALS),
        take_profit: round_to(take_profit, PRICE_DECIMALS),
        lots: calculate_lot_size(
            risk.balance,
            risk.risk_percent,
            entry,
            stop_loss,
            &risk.symbol,
        ),
        confidence,
        risk_reward: risk_reward(direction, entry, stop_loss, take_profit),
        reason: reason.into(),
    }
}

pub(crate) fn indicator_map<const N: usize>(values: [(&str, f64); N]) -> BTreeMap<String, f64> {
    values
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

/// The four ensemble members with their configured parameters.
#[must_use]
pub fn member_strategies(config: &StrategyConfig) -> Vec<Box<dyn QuantStrategy>> {
    vec![
        Box::new(MomentumStrategy::default()),
        Box::new(MeanReversionStrategy::new(
            config.rsi_oversold,
            config.rsi_overbought,
        )),
        Box::new(BreakoutStrategy::default()),
        Box::new(VolatilityBreakoutStrategy::default()),
    ]
}

/// Per-strategy entry of an [`AnalysisReport`]. A failing strategy is reported,
/// not propagated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StrategyReport {
    Outcome(StrategyOutcome),
    Error { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveSignal {
    pub strategy: String,
    pub signal: Signal,
}

/// Every strategy plus the ensemble run over one series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub strategies: BTreeMap<String, StrategyReport>,
    /// Sorted by confidence, highest first
    pub active_signals: Vec<ActiveSignal>,
    pub total_strategies: usize,
    pub strategies_with_signals: usize,
    pub analyzed_at: DateTime<Utc>,
}

/// Runs each member strategy and the ensemble over `series`.
#[must_use]
pub fn analyze_all(
    series: &CandleSeries,
    risk: &AccountRisk,
    config: &StrategyConfig,
) -> AnalysisReport {
    let ensemble = EnsembleStrategy::new(config.clone());
    let mut strategies = BTreeMap::new();
    let mut active_signals = Vec::new();

    let mut record = |name: &str, result: Result<StrategyOutcome, EngineError>| match result {
        Ok(outcome) => {
            active_signals.extend(outcome.signals.iter().map(|signal| ActiveSignal {
                strategy: name.to_string(),
                signal: signal.clone(),
            }));
            strategies.insert(name.to_string(), StrategyReport::Outcome(outcome));
        }
        Err(e) => {
            tracing::debug!(strategy = name, error = %e, "Strategy skipped");
            strategies.insert(
                name.to_string(),
                StrategyReport::Error {
                    error: e.to_string(),
                },
            );
        }
    };

    for strategy in member_strategies(config) {
        record(strategy.name(), strategy.analyze(series, risk));
    }
    record(
        ensemble.name(),
        ensemble.evaluate(series, risk).map(|e| e.outcome),
    );

    active_signals.sort_by(|a, b| b.signal.confidence.total_cmp(&a.signal.confidence));

    AnalysisReport {
        total_strategies: strategies.len(),
        strategies_with_signals: active_signals.len(),
        strategies,
        active_signals,
        analyzed_at: Utc::now(),
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use autotrader_core::{Candle, CandleSeries};

    /// `n` identical bars: open = close = `price`, high/low `half_range` either side.
    pub fn flat(n: usize, price: f64, half_range: f64) -> Vec<Candle> {
        (0..n)
            .map(|_| Candle::new(price, price + half_range, price - half_range, price))
            .collect()
    }

    pub fn series(candles: Vec<Candle>) -> CandleSeries {
        CandleSeries::from_candles(&candles)
    }

    /// Steady climb of 0.001 per bar from 1.0 (range 0.0014), ending with one wide
    /// bullish bar that closes 0.007 above its open.
    pub fn rally_with_expansion() -> CandleSeries {
        let mut candles: Vec<Candle> = (0..59)
            .map(|i| {
                let close = 1.0 + 0.001 * f64::from(i);
                let open = close - 0.001;
                Candle::new(open, close + 0.0002, open - 0.0002, close)
            })
            .collect();
        candles.push(Candle::new(1.058, 1.0652, 1.0578, 1.065));
        series(candles)
    }

    /// Same climb without the final expansion bar.
    pub fn steady_rally(n: u32) -> CandleSeries {
        series(
            (0..n)
                .map(|i| {
                    let close = 1.0 + 0.001 * f64::from(i);
                    let open = close - 0.001;
                    Candle::new(open, close + 0.0002, open - 0.0002, close)
                })
                .collect(),
        )
    }

    /// Mirror image of [`steady_rally`].
    pub fn steady_decline(n: u32) -> CandleSeries {
        series(
            (0..n)
                .map(|i| {
                    let close = 2.0 - 0.001 * f64::from(i);
                    let open = close + 0.001;
                    Candle::new(open, open + 0.0002, close - 0.0002, close)
                })
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixtures::*;

    #[test]
    fn test_propose_rounds_and_sizes() {
        let risk = AccountRisk::default();
        let signal = propose(
            Direction::Buy,
            1.100_004,
            1.098_004,
            1.103_004,
            70.0,
            "test",
            &risk,
        );
        assert!((signal.entry - 1.1).abs() < 1e-12);
        assert!((signal.risk_reward - 1.5).abs() < 1e-9);
        // 20 pip stop, $100 risk, $10/pip/lot
        assert!((signal.lots - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_analyze_all_sorts_active_signals() {
        let report = analyze_all(
            &rally_with_expansion(),
            &AccountRisk::default(),
            &StrategyConfig::default(),
        );
        assert_eq!(report.total_strategies, 5);
        assert!(report.strategies_with_signals >= 3);
        let confidences: Vec<f64> = report
            .active_signals
            .iter()
            .map(|s| s.signal.confidence)
            .collect();
        assert!(confidences.windows(2).all(|w| w[0] >= w[1]));
        assert_eq!(report.active_signals[0].strategy, "Momentum");
    }

    #[test]
    fn test_analyze_all_reports_short_series_per_strategy() {
        let report = analyze_all(
            &series(flat(25, 1.1, 0.001)),
            &AccountRisk::default(),
            &StrategyConfig::default(),
        );
        assert!(matches!(
            report.strategies["Momentum"],
            StrategyReport::Error { .. }
        ));
        assert!(matches!(
            report.strategies["Volatility Breakout"],
            StrategyReport::Outcome(_)
        ));
        assert!(report.active_signals.is_empty());
    }
}
