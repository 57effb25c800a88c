//! Scan and monitor services for the autotrader engine.
//!
//! - [`Scanner`] turns tenant settings and candles into signals and positions
//! - [`PositionMonitor`] closes positions that reach their take-profit or stop-loss
//! - [`AutoTrader`] runs both on independent intervals until shut down
//! - [`Operations`] covers operator actions and tenant queries
//! - [`notifier`] holds the outbound alert channels

pub mod monitor;
pub mod notifier;
pub mod operations;
pub mod scanner;
pub mod service;

pub use monitor::{evaluate_exit, Closure, ExitDecision, MonitorReport, PositionMonitor};
pub use notifier::{LogNotifier, TelegramNotifier};
pub use operations::Operations;
pub use scanner::{ScanOutcome, ScanReport, ScanSummary, Scanner, SkipReason};
pub use service::{AutoTrader, AutoTraderHandle, ServiceStatus};

use autotrader_core::{LogAction, TenantId, TradeStore};
use chrono::{DateTime, Utc};

/// Midnight UTC of the day containing `now`. Daily limits count from here.
#[must_use]
pub fn today_start(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .unwrap_or_default()
        .and_utc()
}

/// Appends an audit row. A failed write is logged and otherwise ignored.
pub(crate) async fn audit(
    store: &dyn TradeStore,
    tenant_id: TenantId,
    action: LogAction,
    symbol: Option<&str>,
    details: Option<&str>,
) {
    if let Err(e) = store.append_log(tenant_id, &action, symbol, details).await {
        tracing::warn!(tenant_id, action = %action, error = %e, "Audit write failed");
    }
}
