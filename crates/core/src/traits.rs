use crate::candles::CandleSeries;
use crate::error::{EngineError, GatewayError};
use crate::position::{
    CloseRequest, ClosedPosition, ManualTrade, NewPosition, Position, PositionId, TenantId,
};
use crate::settings::{ExecutionLogEntry, LogAction, TenantSettings, TenantStats};
use crate::signal::{AccountRisk, ProviderSignal};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Source of OHLC candles.
#[async_trait]
pub trait MarketDataGateway: Send + Sync {
    /// Fetches candles for `symbol`. An empty series is a normal outcome (market
    /// closed, delisted symbol) and is returned as `Ok`.
    async fn fetch(
        &self,
        symbol: &str,
        period: &str,
        interval: &str,
    ) -> Result<CandleSeries, GatewayError>;

    /// Latest traded price: minute bars for the day, falling back to hourly bars
    /// over five days.
    async fn latest_price(&self, symbol: &str) -> Result<Option<f64>, GatewayError> {
        let series = self.fetch(symbol, "1d", "1m").await?;
        if let Some(price) = series.last_close() {
            return Ok(Some(price));
        }
        Ok(self.fetch(symbol, "5d", "1h").await?.last_close())
    }
}

/// Turns candles into at most one proposal with an execution probability.
pub trait SignalProvider: Send + Sync {
    fn name(&self) -> &str;

    /// `Ok(None)` means no actionable signal.
    ///
    /// # Errors
    /// Returns [`EngineError::InsufficientData`] for short series, or
    /// [`EngineError::ProviderUnavailable`] when the provider is not wired in.
    fn analyze(
        &self,
        series: &CandleSeries,
        risk: &AccountRisk,
    ) -> Result<Option<ProviderSignal>, EngineError>;
}

/// Outbound notification channel. Failures are reported as `false`, never raised.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, tenant_id: TenantId, message: &str) -> bool;
}

/// Persistent state shared by the scanner, the monitor and operator actions.
///
/// Implementations must make [`TradeStore::open_position_if_none`] and
/// [`TradeStore::close_position`] atomic.
#[async_trait]
pub trait TradeStore: Send + Sync {
    /// Saved settings, or defaults if the tenant never saved any.
    async fn load_settings(&self, tenant_id: TenantId) -> Result<TenantSettings, EngineError>;

    async fn save_settings(
        &self,
        tenant_id: TenantId,
        settings: &TenantSettings,
    ) -> Result<(), EngineError>;

    async fn enabled_tenants(&self) -> Result<Vec<TenantId>, EngineError>;

    /// Creates the account with `initial` if missing; returns the current balance.
    async fn ensure_account(
        &self,
        tenant_id: TenantId,
        initial: Decimal,
    ) -> Result<Decimal, EngineError>;

    async fn balance(&self, tenant_id: TenantId) -> Result<Option<Decimal>, EngineError>;

    async fn count_opened_since(
        &self,
        tenant_id: TenantId,
        since: DateTime<Utc>,
    ) -> Result<u64, EngineError>;

    async fn has_open_position(&self, tenant_id: TenantId, symbol: &str)
        -> Result<bool, EngineError>;

    /// Inserts the position only if no OPEN position exists for the same tenant
    /// and symbol.
    ///
    /// # Errors
    /// [`crate::error::InvariantViolation::DuplicateOpenPosition`] when one does.
    async fn open_position_if_none(&self, new: &NewPosition) -> Result<Position, EngineError>;

    async fn open_positions(&self) -> Result<Vec<Position>, EngineError>;

    async fn position(&self, id: PositionId) -> Result<Option<Position>, EngineError>;

    /// Refreshes `current_price` of an OPEN position. Returns false if the position
    /// is no longer open.
    async fn update_current_price(&self, id: PositionId, price: f64) -> Result<bool, EngineError>;

    /// Closes the position and adjusts the balance by its P&L in one transaction.
    ///
    /// # Errors
    /// [`crate::error::InvariantViolation::PositionNotOpen`] if the position is not
    /// OPEN; nothing is written in that case.
    async fn close_position(&self, request: &CloseRequest) -> Result<ClosedPosition, EngineError>;

    /// Inserts an already-closed trade and applies its P&L to the balance.
    async fn record_manual_trade(&self, trade: &ManualTrade) -> Result<Position, EngineError>;

    async fn append_log(
        &self,
        tenant_id: TenantId,
        action: &LogAction,
        symbol: Option<&str>,
        details: Option<&str>,
    ) -> Result<(), EngineError>;

    async fn recent_logs(
        &self,
        tenant_id: TenantId,
        limit: u32,
    ) -> Result<Vec<ExecutionLogEntry>, EngineError>;

    async fn recent_positions(
        &self,
        tenant_id: TenantId,
        limit: u32,
    ) -> Result<Vec<Position>, EngineError>;

    async fn tenant_stats(
        &self,
        tenant_id: TenantId,
        today_start: DateTime<Utc>,
    ) -> Result<TenantStats, EngineError>;
}
