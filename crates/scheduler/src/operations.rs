//! Operator actions and tenant queries, plus the open/close paths shared with
//! the scanner and the monitor.

use crate::notifier::position_closed_message;
use crate::{audit, today_start};
use autotrader_core::position::correctness_from_pnl;
use autotrader_core::{
    CloseRequest, ClosedPosition, EngineError, ExecutionLogEntry, ExitReason, InvariantViolation,
    LogAction, ManualTrade, MarketDataGateway, NewPosition, Notifier, Position, PositionId,
    ProviderSignal, SchedulerConfig, TenantId, TenantSettings, TenantStats, TradeStore,
};
use chrono::Utc;
use std::sync::Arc;

/// Opens a position from a provider signal and audits it.
///
/// # Errors
/// [`InvariantViolation::DuplicateOpenPosition`] if the tenant already holds the
/// instrument.
pub(crate) async fn open_from_signal(
    store: &dyn TradeStore,
    tenant_id: TenantId,
    signal: &ProviderSignal,
) -> Result<Position, EngineError> {
    let s = &signal.signal;
    let position = store
        .open_position_if_none(&NewPosition {
            tenant_id,
            symbol: signal.symbol.clone(),
            direction: s.direction,
            entry_price: s.entry,
            current_price: signal.current_price,
            stop_loss: s.stop_loss,
            take_profit: s.take_profit,
            lots: s.lots,
            probability: signal.probability,
        })
        .await?;

    tracing::info!(
        tenant_id,
        symbol = %position.symbol,
        position_id = position.id,
        direction = %position.direction,
        "Position opened"
    );
    let details = format!(
        "{} @ {}, SL: {}, TP: {}",
        s.direction, s.entry, s.stop_loss, s.take_profit
    );
    audit(
        store,
        tenant_id,
        LogAction::TradeExecuted,
        Some(&signal.symbol),
        Some(&details),
    )
    .await;
    Ok(position)
}

/// Closes `position` at `exit_price`, settles the balance, audits the close and
/// notifies the tenant if they asked for alerts.
pub(crate) async fn close_and_report(
    store: &dyn TradeStore,
    notifier: &dyn Notifier,
    position: &Position,
    exit_price: f64,
    reason: ExitReason,
    is_direction_correct: Option<bool>,
) -> Result<ClosedPosition, EngineError> {
    let request = CloseRequest::for_position(position, exit_price, reason, is_direction_correct);
    let closed = store.close_position(&request).await?;
    let tenant_id = position.tenant_id;

    tracing::info!(
        tenant_id,
        position_id = position.id,
        symbol = %position.symbol,
        reason = %reason,
        pnl = %closed.position.realized_pnl,
        "Position closed"
    );
    let correct = match is_direction_correct {
        Some(true) => "Yes",
        Some(false) => "No",
        None => "Unknown",
    };
    let details = format!(
        "Exit: {exit_price}, P&L: ${}, Correct: {correct}",
        closed.position.realized_pnl
    );
    audit(
        store,
        tenant_id,
        LogAction::PositionClosed(reason),
        Some(&position.symbol),
        Some(&details),
    )
    .await;

    let notify = match store.load_settings(tenant_id).await {
        Ok(settings) => settings.notifications_enabled,
        Err(e) => {
            tracing::warn!(tenant_id, error = %e, "Settings unavailable, notifying anyway");
            true
        }
    };
    if notify {
        notifier
            .notify(tenant_id, &position_closed_message(&closed, Utc::now()))
            .await;
    }
    Ok(closed)
}

/// Actions an operator takes outside the scan loop.
pub struct Operations {
    store: Arc<dyn TradeStore>,
    gateway: Arc<dyn MarketDataGateway>,
    notifier: Arc<dyn Notifier>,
    config: SchedulerConfig,
}

impl Operations {
    #[must_use]
    pub fn new(
        store: Arc<dyn TradeStore>,
        gateway: Arc<dyn MarketDataGateway>,
        notifier: Arc<dyn Notifier>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            notifier,
            config,
        }
    }

    /// Opens a position from a signal the tenant reviewed by hand.
    ///
    /// # Errors
    /// Fails when the tenant already holds the instrument.
    pub async fn execute_scan_result(
        &self,
        tenant_id: TenantId,
        signal: &ProviderSignal,
    ) -> Result<Position, EngineError> {
        open_from_signal(self.store.as_ref(), tenant_id, signal).await
    }

    /// Closes a position at the current market price.
    ///
    /// The direction counts as correct when the P&L is positive, wrong when it
    /// is negative, and stays unknown when flat.
    ///
    /// # Errors
    /// - [`InvariantViolation::ForeignPosition`] if `tenant_id` does not own it
    /// - [`InvariantViolation::PositionNotOpen`] if it is missing or already closed
    /// - [`EngineError::DataUnavailable`] if no price can be obtained
    pub async fn close_manually(
        &self,
        tenant_id: TenantId,
        position_id: PositionId,
    ) -> Result<ClosedPosition, EngineError> {
        let position = self
            .store
            .position(position_id)
            .await?
            .ok_or(InvariantViolation::PositionNotOpen { position_id })?;
        if position.tenant_id != tenant_id {
            return Err(InvariantViolation::ForeignPosition {
                position_id,
                tenant_id,
            }
            .into());
        }
        if !position.is_open() {
            return Err(InvariantViolation::PositionNotOpen { position_id }.into());
        }

        let price = self
            .gateway
            .latest_price(&position.symbol)
            .await?
            .ok_or_else(|| EngineError::data_unavailable(&position.symbol, "no current price"))?;
        let correct = correctness_from_pnl(position.pnl_for_exit(price));

        close_and_report(
            self.store.as_ref(),
            self.notifier.as_ref(),
            &position,
            price,
            ExitReason::Manual,
            correct,
        )
        .await
    }

    /// # Errors
    /// Store failure.
    pub async fn settings(&self, tenant_id: TenantId) -> Result<TenantSettings, EngineError> {
        self.store.load_settings(tenant_id).await
    }

    /// Saves new settings. The next scan picks them up.
    ///
    /// # Errors
    /// Store failure.
    pub async fn update_settings(
        &self,
        tenant_id: TenantId,
        settings: &TenantSettings,
    ) -> Result<(), EngineError> {
        self.store.save_settings(tenant_id, settings).await?;
        let details = format!(
            "Method: {}, Auto-execute: {}",
            settings.signal_method, settings.auto_execute
        );
        audit(
            self.store.as_ref(),
            tenant_id,
            LogAction::SettingsUpdated,
            None,
            Some(&details),
        )
        .await;
        Ok(())
    }

    /// Books a trade entered by hand with a known outcome.
    ///
    /// # Errors
    /// Store failure.
    pub async fn record_manual_trade(&self, trade: &ManualTrade) -> Result<Position, EngineError> {
        let position = self.store.record_manual_trade(trade).await?;
        let details = format!(
            "{} @ {} -> {}, P&L: ${}",
            trade.direction, trade.entry_price, trade.exit_price, trade.realized_pnl
        );
        audit(
            self.store.as_ref(),
            trade.tenant_id,
            LogAction::ManualTrade,
            Some(&trade.symbol),
            Some(&details),
        )
        .await;
        Ok(position)
    }

    /// # Errors
    /// Store failure.
    pub async fn stats(&self, tenant_id: TenantId) -> Result<TenantStats, EngineError> {
        self.store
            .tenant_stats(tenant_id, today_start(Utc::now()))
            .await
    }

    /// Most recent positions, newest first. `None` uses the configured default.
    ///
    /// # Errors
    /// Store failure.
    pub async fn recent_positions(
        &self,
        tenant_id: TenantId,
        limit: Option<u32>,
    ) -> Result<Vec<Position>, EngineError> {
        self.store
            .recent_positions(tenant_id, limit.unwrap_or(self.config.recent_positions_limit))
            .await
    }

    /// # Errors
    /// Store failure.
    pub async fn recent_logs(
        &self,
        tenant_id: TenantId,
        limit: Option<u32>,
    ) -> Result<Vec<ExecutionLogEntry>, EngineError> {
        self.store
            .recent_logs(tenant_id, limit.unwrap_or(self.config.recent_logs_limit))
            .await
    }
}
