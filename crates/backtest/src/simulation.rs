//! Walk-forward replay of the ensemble over historical candles.
//!
//! At every step the ensemble only sees bars before the entry bar. The trade is
//! then settled at the best close over the following holding window, with P&L
//! clamped to what the stop and target would have allowed.

use crate::metrics::{PortfolioStats, PortfolioTracker};
use autotrader_core::position::realized_pnl;
use autotrader_core::{AccountRisk, CandleSeries, Direction, StrategyConfig};
use autotrader_strategy::EnsembleStrategy;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub initial_balance: Decimal,
    pub risk_percent: f64,
    pub strategy: StrategyConfig,
    /// First entry bar; the ensemble needs this much history
    pub lookback: usize,
    /// Bars between consecutive entries
    pub step: usize,
    /// Bars a trade is held
    pub horizon: usize,
    /// Instruments with fewer bars are skipped
    pub min_bars: usize,
    pub max_trades: usize,
    pub max_equity_points: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            initial_balance: Decimal::from(10_000),
            risk_percent: 1.0,
            strategy: StrategyConfig::default(),
            lookback: 50,
            step: 5,
            horizon: 5,
            min_bars: 60,
            max_trades: 50,
            max_equity_points: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatedTrade {
    pub symbol: String,
    /// Index of the entry bar in the instrument's series
    pub bar_index: usize,
    pub direction: Direction,
    pub entry_price: f64,
    pub exit_price: f64,
    pub lots: f64,
    pub pnl: Decimal,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    /// 0 is the starting balance, n the balance after the n-th trade
    pub trade_number: usize,
    pub balance: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    /// Most recent trades, ordered by entry bar
    pub trades: Vec<SimulatedTrade>,
    pub stats: PortfolioStats,
    pub equity_curve: Vec<EquityPoint>,
}

/// Limits a trade's P&L to `[-max_loss, max_loss × risk_reward]`, where
/// `max_loss` is `risk_percent` of `balance`.
#[must_use]
pub fn clamp_pnl(pnl: Decimal, balance: Decimal, risk_percent: f64, risk_reward: f64) -> Decimal {
    let max_loss = Decimal::from_f64(risk_percent / 100.0).unwrap_or(Decimal::ZERO) * balance;
    let max_profit = Decimal::from_f64(risk_reward).unwrap_or(Decimal::ZERO) * max_loss;
    pnl.max(-max_loss).min(max_profit).round_dp(2)
}

/// Replays the ensemble over every instrument in turn against one shared balance.
#[must_use]
pub fn simulate_portfolio(
    series_by_symbol: &[(String, CandleSeries)],
    config: &SimulationConfig,
) -> SimulationResult {
    let ensemble = EnsembleStrategy::new(config.strategy.clone());
    let mut tracker = PortfolioTracker::new(config.initial_balance);
    let mut trades = Vec::new();
    let step = config.step.max(1);

    for (symbol, series) in series_by_symbol {
        if series.len() < config.min_bars {
            tracing::info!(symbol = %symbol, bars = series.len(), "Too little history, skipped");
            continue;
        }
        let closes = series.closes();
        let last_entry = series.len().saturating_sub(config.horizon);

        for i in (config.lookback..last_entry).step_by(step) {
            let balance = tracker.balance();
            let risk = AccountRisk::new(
                balance.to_f64().unwrap_or(0.0),
                config.risk_percent,
                symbol.as_str(),
            );
            let signal = match ensemble.evaluate(&series.prefix(i), &risk) {
                Ok(outcome) => match outcome.outcome.top_signal() {
                    Some(signal) if signal.direction.is_directional() => signal.clone(),
                    _ => continue,
                },
                Err(e) => {
                    tracing::debug!(symbol = %symbol, bar = i, error = %e, "Step skipped");
                    continue;
                }
            };

            let entry_price = closes[i];
            let window = &closes[i..i + config.horizon];
            let exit_price = match signal.direction {
                Direction::Sell => window.iter().copied().fold(f64::INFINITY, f64::min),
                _ => window.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            };

            let pnl = clamp_pnl(
                realized_pnl(signal.direction, entry_price, exit_price, signal.lots),
                balance,
                config.risk_percent,
                signal.risk_reward,
            );
            tracker.add_trade(pnl);
            trades.push(SimulatedTrade {
                symbol: symbol.clone(),
                bar_index: i,
                direction: signal.direction,
                entry_price,
                exit_price,
                lots: signal.lots,
                pnl,
                confidence: signal.confidence,
            });
        }
    }

    trades.sort_by_key(|t| t.bar_index);
    let skip = trades.len().saturating_sub(config.max_trades);
    let trades = trades.split_off(skip);

    let curve = tracker.equity_curve();
    let first = curve.len().saturating_sub(config.max_equity_points);
    let equity_curve = curve
        .iter()
        .enumerate()
        .skip(first)
        .map(|(trade_number, balance)| EquityPoint {
            trade_number,
            balance: balance.round_dp(2),
        })
        .collect();

    SimulationResult {
        trades,
        stats: tracker.stats(),
        equity_curve,
    }
}
