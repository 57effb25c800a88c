use crate::signal::Direction;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Units per standard lot used by the simplified P&L model.
pub const LOT_UNITS: f64 = 100_000.0;

pub type TenantId = i64;
pub type PositionId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionStatus {
    Open,
    Closed,
}

impl PositionStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Closed => "CLOSED",
        }
    }
}

impl FromStr for PositionStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "OPEN" => Ok(Self::Open),
            "CLOSED" => Ok(Self::Closed),
            other => anyhow::bail!("unknown position status: {other}"),
        }
    }
}

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitReason {
    TpHit,
    SlHit,
    Manual,
}

impl ExitReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TpHit => "TP_HIT",
            Self::SlHit => "SL_HIT",
            Self::Manual => "MANUAL",
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExitReason {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "TP_HIT" => Ok(Self::TpHit),
            "SL_HIT" => Ok(Self::SlHit),
            "MANUAL" => Ok(Self::Manual),
            other => anyhow::bail!("unknown exit reason: {other}"),
        }
    }
}

/// A simulated position.
///
/// Fields set at open never change. The closing fields (`exit_price`,
/// `exit_reason`, `realized_pnl`, `is_direction_correct`, `closed_at`) are written
/// together in one store transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub tenant_id: TenantId,
    pub symbol: String,
    pub direction: Direction,
    pub entry_price: f64,
    pub current_price: Option<f64>,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub lots: f64,
    pub probability: Option<f64>,
    pub status: PositionStatus,
    pub exit_price: Option<f64>,
    pub exit_reason: Option<ExitReason>,
    pub realized_pnl: Decimal,
    /// `None` while open, or when a manual close lands exactly on entry
    pub is_direction_correct: Option<bool>,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Position {
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }

    /// Pip-style move from entry to `exit`, positive when the trade made money.
    #[must_use]
    pub fn pnl_pips(&self, exit: f64) -> f64 {
        pnl_pips(self.direction, self.entry_price, exit)
    }

    /// Realized P&L if the position closed at `exit`.
    #[must_use]
    pub fn pnl_for_exit(&self, exit: f64) -> Decimal {
        realized_pnl(self.direction, self.entry_price, exit, self.lots)
    }
}

/// Relative move expressed in basis-point "pips": `(exit - entry) / entry × 10000`,
/// sign-flipped for SELL.
#[must_use]
pub fn pnl_pips(direction: Direction, entry: f64, exit: f64) -> f64 {
    if entry == 0.0 {
        return 0.0;
    }
    let raw = (exit - entry) / entry * 10_000.0;
    match direction {
        Direction::Buy => raw,
        Direction::Sell => -raw,
        Direction::Wait => 0.0,
    }
}

/// Simplified P&L: `pnl_pips × lots × LOT_UNITS / 10000`, rounded to cents.
#[must_use]
pub fn realized_pnl(direction: Direction, entry: f64, exit: f64, lots: f64) -> Decimal {
    let pnl = pnl_pips(direction, entry, exit) * lots * LOT_UNITS / 10_000.0;
    Decimal::from_f64(pnl)
        .map(|d| d.round_dp(2))
        .unwrap_or(Decimal::ZERO)
}

/// Direction correctness for a close at market: right if it made money, wrong if
/// it lost, unknown if flat.
#[must_use]
pub fn correctness_from_pnl(pnl: Decimal) -> Option<bool> {
    if pnl > Decimal::ZERO {
        Some(true)
    } else if pnl < Decimal::ZERO {
        Some(false)
    } else {
        None
    }
}

/// Fields required to open a position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPosition {
    pub tenant_id: TenantId,
    pub symbol: String,
    pub direction: Direction,
    pub entry_price: f64,
    pub current_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub lots: f64,
    pub probability: f64,
}

/// Everything needed to close a position and settle the balance in one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloseRequest {
    pub position_id: PositionId,
    pub tenant_id: TenantId,
    pub exit_price: f64,
    pub exit_reason: ExitReason,
    pub realized_pnl: Decimal,
    pub is_direction_correct: Option<bool>,
}

impl CloseRequest {
    /// Builds a close for `position` at `exit_price`; P&L is derived here so the
    /// store never recomputes it.
    #[must_use]
    pub fn for_position(
        position: &Position,
        exit_price: f64,
        exit_reason: ExitReason,
        is_direction_correct: Option<bool>,
    ) -> Self {
        Self {
            position_id: position.id,
            tenant_id: position.tenant_id,
            exit_price,
            exit_reason,
            realized_pnl: position.pnl_for_exit(exit_price),
            is_direction_correct,
        }
    }
}

/// Result of an atomic close.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedPosition {
    pub position: Position,
    pub new_balance: Decimal,
}

/// A trade entered by an operator with a known outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualTrade {
    pub tenant_id: TenantId,
    pub symbol: String,
    pub direction: Direction,
    pub entry_price: f64,
    pub exit_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub lots: f64,
    pub realized_pnl: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn position(direction: Direction, entry: f64, lots: f64) -> Position {
        Position {
            id: 1,
            tenant_id: 1,
            symbol: "EUR/USD".to_string(),
            direction,
            entry_price: entry,
            current_price: Some(entry),
            stop_loss: 0.0,
            take_profit: 0.0,
            lots,
            probability: Some(70.0),
            status: PositionStatus::Open,
            exit_price: None,
            exit_reason: None,
            realized_pnl: Decimal::ZERO,
            is_direction_correct: None,
            opened_at: Utc::now(),
            closed_at: None,
        }
    }

    #[test]
    fn test_buy_pnl() {
        let pos = position(Direction::Buy, 1.0, 1.0);
        // +1% = 100 pips, 1 lot -> $1000
        assert_eq!(pos.pnl_for_exit(1.01), dec!(1000.00));
        assert_eq!(pos.pnl_for_exit(0.995), dec!(-500.00));
    }

    #[test]
    fn test_sell_pnl_is_mirrored() {
        let pos = position(Direction::Sell, 2.0, 0.5);
        // price falls 1% -> +100 pips × 0.5 lots
        assert_eq!(pos.pnl_for_exit(1.98), dec!(500.00));
        assert!(pos.pnl_pips(2.02) < 0.0);
    }

    #[test]
    fn test_flat_close() {
        let pos = position(Direction::Buy, 1.1, 0.2);
        assert_eq!(pos.pnl_for_exit(1.1), Decimal::ZERO);
        assert_eq!(correctness_from_pnl(Decimal::ZERO), None);
        assert_eq!(correctness_from_pnl(dec!(0.01)), Some(true));
        assert_eq!(correctness_from_pnl(dec!(-0.01)), Some(false));
    }

    #[test]
    fn test_close_request_derives_pnl() {
        let pos = position(Direction::Buy, 1.0, 0.1);
        let req = CloseRequest::for_position(&pos, 1.002, ExitReason::TpHit, Some(true));
        assert_eq!(req.realized_pnl, dec!(20.00));
        assert_eq!(req.exit_reason.to_string(), "TP_HIT");
    }

    #[test]
    fn test_enum_round_trips_through_strings() {
        for reason in [ExitReason::TpHit, ExitReason::SlHit, ExitReason::Manual] {
            assert_eq!(reason.as_str().parse::<ExitReason>().unwrap(), reason);
        }
        assert_eq!("open".parse::<PositionStatus>().unwrap(), PositionStatus::Open);
    }
}
