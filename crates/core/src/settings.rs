use crate::instrument::round_to;
use crate::position::TenantId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which signal provider a tenant scans with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalMethod {
    /// Weighted strategy ensemble
    #[default]
    Ml,
    /// Market-structure / liquidity analysis
    Ict,
    /// ML and structure combined
    Hybrid,
}

impl SignalMethod {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ml => "ML",
            Self::Ict => "ICT",
            Self::Hybrid => "HYBRID",
        }
    }
}

impl fmt::Display for SignalMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignalMethod {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ML" | "" => Ok(Self::Ml),
            "ICT" => Ok(Self::Ict),
            "HYBRID" => Ok(Self::Hybrid),
            other => anyhow::bail!("unknown signal method: {other}"),
        }
    }
}

/// Per-tenant automation settings. Loaded fresh at the start of every scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantSettings {
    #[serde(default)]
    pub enabled: bool,
    /// Minutes; informational, the service runs a single global scan cadence
    #[serde(default = "default_scan_interval")]
    pub scan_interval: u32,
    #[serde(default = "default_probability_threshold")]
    pub probability_threshold: f64,
    #[serde(default = "default_max_open_positions_per_day")]
    pub max_open_positions_per_day: u32,
    #[serde(default)]
    pub auto_execute: bool,
    #[serde(default = "default_notifications_enabled")]
    pub notifications_enabled: bool,
    #[serde(default)]
    pub signal_method: SignalMethod,
    /// Comma-separated symbols
    #[serde(default = "default_watched_instruments")]
    pub watched_instruments: String,
}

const fn default_scan_interval() -> u32 {
    30
}

const fn default_probability_threshold() -> f64 {
    65.0
}

const fn default_max_open_positions_per_day() -> u32 {
    3
}

const fn default_notifications_enabled() -> bool {
    true
}

fn default_watched_instruments() -> String {
    "EUR/USD,GBP/USD,XAU/USD".to_string()
}

impl Default for TenantSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            scan_interval: default_scan_interval(),
            probability_threshold: default_probability_threshold(),
            max_open_positions_per_day: default_max_open_positions_per_day(),
            auto_execute: false,
            notifications_enabled: default_notifications_enabled(),
            signal_method: SignalMethod::Ml,
            watched_instruments: default_watched_instruments(),
        }
    }
}

impl TenantSettings {
    /// Watched symbols, trimmed, empty entries dropped.
    #[must_use]
    pub fn instruments(&self) -> Vec<String> {
        self.watched_instruments
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Applies a `key=value` override, as used by the CLI.
    ///
    /// # Errors
    /// Returns an error for unknown keys or unparsable values.
    pub fn apply(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        let value = value.trim();
        match key.trim() {
            "enabled" => self.enabled = parse_flag(value)?,
            "scan_interval" => self.scan_interval = value.parse()?,
            "probability_threshold" => self.probability_threshold = value.parse()?,
            "max_open_positions_per_day" => self.max_open_positions_per_day = value.parse()?,
            "auto_execute" => self.auto_execute = parse_flag(value)?,
            "notifications_enabled" => self.notifications_enabled = parse_flag(value)?,
            "signal_method" => self.signal_method = value.parse()?,
            "watched_instruments" => self.watched_instruments = value.to_string(),
            other => anyhow::bail!("unknown setting: {other}"),
        }
        Ok(())
    }
}

fn parse_flag(value: &str) -> anyhow::Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("expected a boolean, got {other}"),
    }
}

/// Audit actions written by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogAction {
    ScanStarted,
    ScanSkipped,
    SignalFound,
    TradeExecuted,
    ScanCompleted,
    PositionClosed(crate::position::ExitReason),
    SettingsUpdated,
    ManualTrade,
}

impl LogAction {
    #[must_use]
    pub fn as_string(&self) -> String {
        match self {
            Self::ScanStarted => "SCAN_STARTED".to_string(),
            Self::ScanSkipped => "SCAN_SKIPPED".to_string(),
            Self::SignalFound => "SIGNAL_FOUND".to_string(),
            Self::TradeExecuted => "TRADE_EXECUTED".to_string(),
            Self::ScanCompleted => "SCAN_COMPLETED".to_string(),
            Self::PositionClosed(reason) => format!("POSITION_CLOSED_{reason}"),
            Self::SettingsUpdated => "SETTINGS_UPDATED".to_string(),
            Self::ManualTrade => "MANUAL_TRADE".to_string(),
        }
    }
}

impl fmt::Display for LogAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_string())
    }
}

/// One append-only audit row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionLogEntry {
    pub id: i64,
    pub tenant_id: TenantId,
    pub action: String,
    pub symbol: Option<String>,
    pub details: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Aggregate execution statistics for a tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TenantStats {
    pub total_trades: u64,
    pub closed_trades: u64,
    pub open_trades: u64,
    pub today_trades: u64,
    pub correct_predictions: u64,
    pub wrong_predictions: u64,
    /// Percent of closed trades with the direction right, 1 dp
    pub accuracy_rate: f64,
    /// Percent of closed trades with positive P&L, 1 dp
    pub win_rate: f64,
    pub total_pnl: Decimal,
    pub tp_hits: u64,
    pub sl_hits: u64,
}

impl TenantStats {
    /// Fills in the two rates from raw counts.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn with_rates(mut self, profitable: u64) -> Self {
        if self.closed_trades > 0 {
            let closed = self.closed_trades as f64;
            self.accuracy_rate =
                round_to(self.correct_predictions as f64 / closed * 100.0, 1);
            self.win_rate = round_to(profitable as f64 / closed * 100.0, 1);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::ExitReason;

    #[test]
    fn test_defaults() {
        let s = TenantSettings::default();
        assert!(!s.enabled);
        assert_eq!(s.scan_interval, 30);
        assert!((s.probability_threshold - 65.0).abs() < f64::EPSILON);
        assert_eq!(s.max_open_positions_per_day, 3);
        assert!(!s.auto_execute);
        assert!(s.notifications_enabled);
        assert_eq!(s.signal_method, SignalMethod::Ml);
        assert_eq!(s.instruments(), vec!["EUR/USD", "GBP/USD", "XAU/USD"]);
    }

    #[test]
    fn test_missing_fields_deserialize_to_defaults() {
        let s: TenantSettings = serde_json::from_str(r#"{"enabled": true}"#).unwrap();
        assert!(s.enabled);
        assert_eq!(s.max_open_positions_per_day, 3);
        assert_eq!(s.signal_method, SignalMethod::Ml);
    }

    #[test]
    fn test_instrument_parsing_trims() {
        let s = TenantSettings {
            watched_instruments: " EUR/USD , ,USD/JPY,".to_string(),
            ..TenantSettings::default()
        };
        assert_eq!(s.instruments(), vec!["EUR/USD", "USD/JPY"]);
    }

    #[test]
    fn test_apply_overrides() {
        let mut s = TenantSettings::default();
        s.apply("enabled", "true").unwrap();
        s.apply("probability_threshold", "72.5").unwrap();
        s.apply("signal_method", "hybrid").unwrap();
        s.apply("auto_execute", "1").unwrap();
        assert!(s.enabled && s.auto_execute);
        assert!((s.probability_threshold - 72.5).abs() < f64::EPSILON);
        assert_eq!(s.signal_method, SignalMethod::Hybrid);
        assert!(s.apply("colour", "blue").is_err());
        assert!(s.apply("enabled", "maybe").is_err());
    }

    #[test]
    fn test_log_action_names() {
        assert_eq!(LogAction::ScanSkipped.to_string(), "SCAN_SKIPPED");
        assert_eq!(
            LogAction::PositionClosed(ExitReason::SlHit).to_string(),
            "POSITION_CLOSED_SL_HIT"
        );
    }

    #[test]
    fn test_stats_rates() {
        let stats = TenantStats {
            closed_trades: 3,
            correct_predictions: 2,
            ..TenantStats::default()
        }
        .with_rates(1);
        assert!((stats.accuracy_rate - 66.7).abs() < 1e-9);
        assert!((stats.win_rate - 33.3).abs() < 1e-9);

        let empty = TenantStats::default().with_rates(0);
        assert!(empty.accuracy_rate.abs() < f64::EPSILON);
    }
}
