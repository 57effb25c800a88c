//! Trade proposals and strategy outputs.
//!
//! A [`Signal`] is produced fresh for every analysis call and never mutated
//! afterwards. Strategies wrap zero or one signal in a [`StrategyOutcome`] together
//! with the indicator values they computed.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Direction of a trade proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    /// Expect price to rise
    Buy,
    /// Expect price to fall
    Sell,
    /// No actionable bias
    Wait,
}

impl Direction {
    /// Returns the opposite direction.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
            Self::Wait => Self::Wait,
        }
    }

    /// Returns true for BUY and SELL.
    #[must_use]
    pub const fn is_directional(self) -> bool {
        !matches!(self, Self::Wait)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
            Self::Wait => "WAIT",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BUY" => Ok(Self::Buy),
            "SELL" => Ok(Self::Sell),
            "WAIT" => Ok(Self::Wait),
            other => anyhow::bail!("unknown direction: {other}"),
        }
    }
}

/// A directional trade proposal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub direction: Direction,
    pub entry: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub lots: f64,
    /// 0-100
    pub confidence: f64,
    pub risk_reward: f64,
    /// Human-readable rationale
    pub reason: String,
}

impl Signal {
    /// Distance from entry to stop, signed so that a valid stop is positive.
    #[must_use]
    pub fn risk(&self) -> f64 {
        match self.direction {
            Direction::Buy => self.entry - self.stop_loss,
            Direction::Sell => self.stop_loss - self.entry,
            Direction::Wait => 0.0,
        }
    }

    /// Distance from entry to target, signed so that a valid target is positive.
    #[must_use]
    pub fn reward(&self) -> f64 {
        match self.direction {
            Direction::Buy => self.take_profit - self.entry,
            Direction::Sell => self.entry - self.take_profit,
            Direction::Wait => 0.0,
        }
    }
}

/// Whether a strategy found a setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeStatus {
    Signal,
    NoSignal,
}

/// Result of one strategy run. Absence of a signal is a normal outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyOutcome {
    pub strategy: String,
    pub current_price: f64,
    pub signals: Vec<Signal>,
    pub indicators: BTreeMap<String, f64>,
    pub status: OutcomeStatus,
}

impl StrategyOutcome {
    /// Builds an outcome; the status follows from whether `signals` is empty.
    #[must_use]
    pub fn new(
        strategy: impl Into<String>,
        current_price: f64,
        signals: Vec<Signal>,
        indicators: BTreeMap<String, f64>,
    ) -> Self {
        let status = if signals.is_empty() {
            OutcomeStatus::NoSignal
        } else {
            OutcomeStatus::Signal
        };
        Self {
            strategy: strategy.into(),
            current_price,
            signals,
            indicators,
            status,
        }
    }

    /// First signal, if any.
    #[must_use]
    pub fn top_signal(&self) -> Option<&Signal> {
        self.signals.first()
    }

    #[must_use]
    pub fn has_signal(&self) -> bool {
        self.status == OutcomeStatus::Signal
    }
}

/// Account parameters every strategy receives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountRisk {
    pub balance: f64,
    /// Percent of balance risked per trade (1.0 = 1%)
    pub risk_percent: f64,
    /// Instrument being analysed; drives pip economics for lot sizing
    pub symbol: String,
}

impl AccountRisk {
    #[must_use]
    pub fn new(balance: f64, risk_percent: f64, symbol: impl Into<String>) -> Self {
        Self {
            balance,
            risk_percent,
            symbol: symbol.into(),
        }
    }
}

impl Default for AccountRisk {
    fn default() -> Self {
        Self::new(10_000.0, 1.0, "EUR/USD")
    }
}

/// A provider's final proposal for one instrument, with its execution
/// probability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSignal {
    pub symbol: String,
    pub signal: Signal,
    /// 0-100, already clamped by the provider
    pub probability: f64,
    /// Why the probability came out the way it did
    pub rationale: String,
    /// Which provider path produced it, e.g. `ML` or `HYBRID_AGREE`
    pub method: String,
    pub current_price: f64,
    pub atr: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_parsing_and_display() {
        assert_eq!("buy".parse::<Direction>().unwrap(), Direction::Buy);
        assert_eq!(" SELL ".parse::<Direction>().unwrap(), Direction::Sell);
        assert!("long".parse::<Direction>().is_err());
        assert_eq!(Direction::Wait.to_string(), "WAIT");
        assert_eq!(Direction::Buy.opposite(), Direction::Sell);
        assert!(!Direction::Wait.is_directional());
    }

    #[test]
    fn test_outcome_status_follows_signals() {
        let empty = StrategyOutcome::new("Momentum", 1.1, Vec::new(), BTreeMap::new());
        assert_eq!(empty.status, OutcomeStatus::NoSignal);
        assert!(empty.top_signal().is_none());

        let signal = Signal {
            direction: Direction::Sell,
            entry: 1.1,
            stop_loss: 1.102,
            take_profit: 1.097,
            lots: 0.5,
            confidence: 70.0,
            risk_reward: 1.5,
            reason: "test".to_string(),
        };
        assert!((signal.risk() - 0.002).abs() < 1e-12);
        assert!((signal.reward() - 0.003).abs() < 1e-12);

        let outcome = StrategyOutcome::new("Momentum", 1.1, vec![signal], BTreeMap::new());
        assert!(outcome.has_signal());
    }

    #[test]
    fn test_serde_wire_names() {
        let json = serde_json::to_string(&OutcomeStatus::NoSignal).unwrap();
        assert_eq!(json, "\"NO_SIGNAL\"");
        let json = serde_json::to_string(&Direction::Buy).unwrap();
        assert_eq!(json, "\"BUY\"");
    }
}
