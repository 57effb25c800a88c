//! Take-profit / stop-loss monitoring of open positions.

use crate::operations::close_and_report;
use autotrader_core::{
    Direction, EngineError, ExitReason, MarketDataGateway, Notifier, Position, PositionId,
    TenantId, TradeStore,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// How a position should be closed at the observed price.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExitDecision {
    pub reason: ExitReason,
    /// The level that was hit, not the observed price
    pub exit_price: f64,
    pub is_direction_correct: bool,
}

/// Checks `price` against the position's levels.
///
/// Touching a level counts as hitting it. Take-profit is checked first, so a
/// position whose target and stop both sit at `price` closes as `TP_HIT`.
#[must_use]
pub fn evaluate_exit(position: &Position, price: f64) -> Option<ExitDecision> {
    let (tp_hit, sl_hit) = match position.direction {
        Direction::Buy => (price >= position.take_profit, price <= position.stop_loss),
        Direction::Sell => (price <= position.take_profit, price >= position.stop_loss),
        Direction::Wait => return None,
    };
    if tp_hit {
        Some(ExitDecision {
            reason: ExitReason::TpHit,
            exit_price: position.take_profit,
            is_direction_correct: true,
        })
    } else if sl_hit {
        Some(ExitDecision {
            reason: ExitReason::SlHit,
            exit_price: position.stop_loss,
            is_direction_correct: false,
        })
    } else {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Closure {
    pub position_id: PositionId,
    pub tenant_id: TenantId,
    pub symbol: String,
    pub reason: ExitReason,
    pub exit_price: f64,
    pub realized_pnl: Decimal,
    pub new_balance: Decimal,
}

/// Result of one pass over the open positions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonitorReport {
    /// Positions a price was obtained for
    pub checked: usize,
    pub price_updated: usize,
    pub closed: Vec<Closure>,
    /// No price available, or the close failed
    pub skipped: usize,
}

/// Polls prices for every open position and closes those that hit a level.
pub struct PositionMonitor {
    store: Arc<dyn TradeStore>,
    gateway: Arc<dyn MarketDataGateway>,
    notifier: Arc<dyn Notifier>,
}

impl PositionMonitor {
    #[must_use]
    pub fn new(
        store: Arc<dyn TradeStore>,
        gateway: Arc<dyn MarketDataGateway>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            gateway,
            notifier,
        }
    }

    /// One monitor pass across all tenants.
    ///
    /// # Errors
    /// Only if the open positions cannot be loaded; per-position failures are
    /// logged and counted as skipped.
    pub async fn tick(&self) -> Result<MonitorReport, EngineError> {
        let positions = self.store.open_positions().await?;
        let mut report = MonitorReport::default();

        for position in &positions {
            let price = match self.gateway.latest_price(&position.symbol).await {
                Ok(Some(price)) => price,
                Ok(None) => {
                    tracing::info!(
                        position_id = position.id,
                        symbol = %position.symbol,
                        "No price, retrying next tick"
                    );
                    report.skipped += 1;
                    continue;
                }
                Err(e) => {
                    tracing::info!(
                        position_id = position.id,
                        symbol = %position.symbol,
                        error = %e,
                        "Price fetch failed, retrying next tick"
                    );
                    report.skipped += 1;
                    continue;
                }
            };
            report.checked += 1;

            let Some(decision) = evaluate_exit(position, price) else {
                match self.store.update_current_price(position.id, price).await {
                    Ok(true) => report.price_updated += 1,
                    Ok(false) => {
                        tracing::debug!(position_id = position.id, "Position closed elsewhere");
                    }
                    Err(e) => {
                        tracing::warn!(
                            position_id = position.id,
                            error = %e,
                            "Price update failed"
                        );
                    }
                }
                continue;
            };

            match close_and_report(
                self.store.as_ref(),
                self.notifier.as_ref(),
                position,
                decision.exit_price,
                decision.reason,
                Some(decision.is_direction_correct),
            )
            .await
            {
                Ok(closed) => report.closed.push(Closure {
                    position_id: position.id,
                    tenant_id: position.tenant_id,
                    symbol: position.symbol.clone(),
                    reason: decision.reason,
                    exit_price: decision.exit_price,
                    realized_pnl: closed.position.realized_pnl,
                    new_balance: closed.new_balance,
                }),
                Err(e) => {
                    if e.is_invariant_violation() {
                        tracing::error!(position_id = position.id, error = %e, "Close rejected");
                    } else {
                        tracing::error!(
                            position_id = position.id,
                            error = %e,
                            "Close failed, retrying next tick"
                        );
                    }
                    report.skipped += 1;
                }
            }
        }

        if !report.closed.is_empty() {
            tracing::info!(
                checked = report.checked,
                closed = report.closed.len(),
                "Monitor pass closed positions"
            );
        }
        Ok(report)
    }
}
