//! Per-tenant signal scans.

use crate::notifier::signal_detected_message;
use crate::operations::open_from_signal;
use crate::{audit, today_start};
use autotrader_core::{
    AccountRisk, EngineError, LogAction, MarketDataConfig, MarketDataGateway, Notifier, Position,
    ProviderSignal, TenantId, TenantSettings, TradeStore, TradingConfig,
};
use autotrader_strategy::ProviderRegistry;
use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanOutcome {
    Completed,
    /// Automation is switched off for the tenant
    Disabled,
    /// Today's opened positions already reached the cap
    DailyLimitReached,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    AlreadyOpen,
    DataUnavailable(String),
    ProviderError(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedInstrument {
    pub symbol: String,
    pub reason: SkipReason,
}

/// What one scan of one tenant did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanReport {
    pub tenant_id: TenantId,
    pub outcome: ScanOutcome,
    /// Instruments that reached the provider
    pub examined: usize,
    pub skipped: Vec<SkippedInstrument>,
    /// Signals at or above the tenant's threshold
    pub signals: Vec<ProviderSignal>,
    pub opened: Vec<Position>,
}

impl ScanReport {
    fn new(tenant_id: TenantId, outcome: ScanOutcome) -> Self {
        Self {
            tenant_id,
            outcome,
            examined: 0,
            skipped: Vec::new(),
            signals: Vec::new(),
            opened: Vec::new(),
        }
    }
}

/// One pass over every enabled tenant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub reports: Vec<ScanReport>,
    /// Tenants whose scan failed outright
    pub failed: Vec<TenantId>,
}

impl ScanSummary {
    #[must_use]
    pub fn signals(&self) -> usize {
        self.reports.iter().map(|r| r.signals.len()).sum()
    }

    #[must_use]
    pub fn opened(&self) -> usize {
        self.reports.iter().map(|r| r.opened.len()).sum()
    }
}

/// Runs the configured signal provider over a tenant's watched instruments.
pub struct Scanner {
    store: Arc<dyn TradeStore>,
    gateway: Arc<dyn MarketDataGateway>,
    providers: ProviderRegistry,
    notifier: Arc<dyn Notifier>,
    market_data: MarketDataConfig,
    trading: TradingConfig,
}

impl Scanner {
    #[must_use]
    pub fn new(
        store: Arc<dyn TradeStore>,
        gateway: Arc<dyn MarketDataGateway>,
        providers: ProviderRegistry,
        notifier: Arc<dyn Notifier>,
        market_data: MarketDataConfig,
        trading: TradingConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            providers,
            notifier,
            market_data,
            trading,
        }
    }

    /// Scans every enabled tenant in turn. A failing tenant does not stop the pass.
    ///
    /// # Errors
    /// Only if the tenant list cannot be loaded.
    pub async fn scan_all(&self) -> Result<ScanSummary, EngineError> {
        let tenants = self.store.enabled_tenants().await?;
        let mut summary = ScanSummary::default();

        for tenant_id in tenants {
            match self.scan_tenant(tenant_id).await {
                Ok(report) => summary.reports.push(report),
                Err(e) => {
                    tracing::error!(tenant_id, error = %e, "Scan failed");
                    summary.failed.push(tenant_id);
                }
            }
        }
        tracing::info!(
            tenants = summary.reports.len(),
            failed = summary.failed.len(),
            signals = summary.signals(),
            opened = summary.opened(),
            "Scan pass complete"
        );
        Ok(summary)
    }

    /// Scans one tenant with settings read fresh from the store.
    ///
    /// # Errors
    /// Store failures while loading settings, the account or the daily count.
    /// Per-instrument failures are recorded in the report instead.
    pub async fn scan_tenant(&self, tenant_id: TenantId) -> Result<ScanReport, EngineError> {
        let settings = self.store.load_settings(tenant_id).await?;
        if !settings.enabled {
            tracing::debug!(tenant_id, "Auto-trading disabled");
            return Ok(ScanReport::new(tenant_id, ScanOutcome::Disabled));
        }

        let store = self.store.as_ref();
        let balance = store
            .ensure_account(tenant_id, self.trading.default_balance)
            .await?;
        let opened_today = store
            .count_opened_since(tenant_id, today_start(Utc::now()))
            .await?;
        let cap = u64::from(settings.max_open_positions_per_day);
        if opened_today >= cap {
            let details = format!("Daily limit reached ({opened_today}/{cap})");
            tracing::info!(tenant_id, opened_today, cap, "Daily limit reached, scan skipped");
            audit(store, tenant_id, LogAction::ScanSkipped, None, Some(&details)).await;
            return Ok(ScanReport::new(tenant_id, ScanOutcome::DailyLimitReached));
        }

        let instruments = settings.instruments();
        let details = format!(
            "Scanning {} instruments with {} method",
            instruments.len(),
            settings.signal_method
        );
        audit(store, tenant_id, LogAction::ScanStarted, None, Some(&details)).await;

        let provider = self.providers.for_method(settings.signal_method);
        let balance = balance.to_f64().unwrap_or(0.0);
        let mut report = ScanReport::new(tenant_id, ScanOutcome::Completed);

        for symbol in &instruments {
            let skip = |reason| SkippedInstrument {
                symbol: symbol.clone(),
                reason,
            };

            match store.has_open_position(tenant_id, symbol).await {
                Ok(false) => {}
                Ok(true) => {
                    tracing::debug!(tenant_id, symbol = %symbol, "Position already open");
                    report.skipped.push(skip(SkipReason::AlreadyOpen));
                    continue;
                }
                Err(e) => {
                    tracing::warn!(
                        tenant_id,
                        symbol = %symbol,
                        error = %e,
                        "Open-position check failed"
                    );
                    report.skipped.push(skip(SkipReason::DataUnavailable(e.to_string())));
                    continue;
                }
            }

            let series = match self
                .gateway
                .fetch(
                    symbol,
                    &self.market_data.analysis_period,
                    &self.market_data.analysis_interval,
                )
                .await
            {
                Ok(series) if series.is_empty() => {
                    tracing::info!(tenant_id, symbol = %symbol, "No market data");
                    report
                        .skipped
                        .push(skip(SkipReason::DataUnavailable("empty series".to_string())));
                    continue;
                }
                Ok(series) => series,
                Err(e) => {
                    tracing::info!(
                        tenant_id,
                        symbol = %symbol,
                        error = %e,
                        "Market data unavailable"
                    );
                    report.skipped.push(skip(SkipReason::DataUnavailable(e.to_string())));
                    continue;
                }
            };

            report.examined += 1;
            let risk = AccountRisk::new(balance, self.trading.risk_percent, symbol.as_str());
            let signal = match provider.analyze(&series, &risk) {
                Ok(Some(signal)) => signal,
                Ok(None) => continue,
                Err(e) => {
                    tracing::info!(
                        tenant_id,
                        symbol = %symbol,
                        provider = provider.name(),
                        error = %e,
                        "No analysis"
                    );
                    report.skipped.push(skip(SkipReason::ProviderError(e.to_string())));
                    continue;
                }
            };

            if signal.probability < settings.probability_threshold {
                tracing::debug!(
                    tenant_id,
                    symbol = %symbol,
                    probability = signal.probability,
                    threshold = settings.probability_threshold,
                    "Below threshold"
                );
                continue;
            }

            let opened_so_far = opened_today + report.opened.len() as u64;
            if let Some(position) = self
                .handle_signal(tenant_id, &settings, &signal, opened_so_far)
                .await
            {
                report.opened.push(position);
            }
            report.signals.push(signal);
        }

        let details = format!(
            "Found {} signals, executed {} trades",
            report.signals.len(),
            report.opened.len()
        );
        audit(store, tenant_id, LogAction::ScanCompleted, None, Some(&details)).await;
        tracing::info!(
            tenant_id,
            examined = report.examined,
            signals = report.signals.len(),
            opened = report.opened.len(),
            "Tenant scan complete"
        );
        Ok(report)
    }

    /// Logs the signal, opens it if the tenant auto-executes and is under the
    /// daily cap, then sends the alert.
    async fn handle_signal(
        &self,
        tenant_id: TenantId,
        settings: &TenantSettings,
        signal: &ProviderSignal,
        opened_so_far: u64,
    ) -> Option<Position> {
        let store = self.store.as_ref();
        let s = &signal.signal;
        tracing::info!(
            tenant_id,
            symbol = %signal.symbol,
            direction = %s.direction,
            probability = signal.probability,
            method = %signal.method,
            "Signal found"
        );
        let details = format!("{} @ {}, Prob: {}%", s.direction, s.entry, signal.probability);
        audit(
            store,
            tenant_id,
            LogAction::SignalFound,
            Some(&signal.symbol),
            Some(&details),
        )
        .await;

        let mut opened = None;
        if settings.auto_execute {
            if opened_so_far < u64::from(settings.max_open_positions_per_day) {
                match open_from_signal(store, tenant_id, signal).await {
                    Ok(position) => opened = Some(position),
                    Err(e) if e.is_invariant_violation() => {
                        tracing::error!(
                            tenant_id,
                            symbol = %signal.symbol,
                            error = %e,
                            "Open rejected"
                        );
                    }
                    Err(e) => {
                        tracing::warn!(
                            tenant_id,
                            symbol = %signal.symbol,
                            error = %e,
                            "Open failed"
                        );
                    }
                }
            } else {
                tracing::info!(
                    tenant_id,
                    symbol = %signal.symbol,
                    "Daily limit reached, signal not executed"
                );
            }
        }

        if settings.notifications_enabled {
            let message = signal_detected_message(signal, opened.is_some(), Utc::now());
            self.notifier.notify(tenant_id, &message).await;
        }
        opened
    }
}
