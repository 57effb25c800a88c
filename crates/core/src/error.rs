use thiserror::Error;

/// Errors raised by the signal engine, the store and the scheduler.
///
/// The variants fall into three classes. Data problems
/// ([`EngineError::DataUnavailable`], [`EngineError::InsufficientData`],
/// [`EngineError::ProviderUnavailable`]) are recoverable: the caller skips the
/// instrument and retries on the next cycle. [`EngineError::Invariant`] aborts the
/// single position action it was raised for. [`EngineError::Store`] wraps
/// persistence failures.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Market data could not be fetched or was empty.
    #[error("market data unavailable for {symbol}: {reason}")]
    DataUnavailable { symbol: String, reason: String },

    /// Not enough candles for the requested analysis.
    #[error("need at least {required} candles, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    /// The configured signal provider is not wired into this process.
    #[error("signal provider {0} is not available")]
    ProviderUnavailable(String),

    /// A position lifecycle rule would be broken by the requested action.
    #[error(transparent)]
    Invariant(#[from] InvariantViolation),

    /// Persistence failure.
    #[error("store error: {0}")]
    Store(String),
}

/// Position lifecycle rules enforced by the store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    /// An OPEN position already exists for this tenant and instrument.
    #[error("tenant {tenant_id} already has an open position on {symbol}")]
    DuplicateOpenPosition { tenant_id: i64, symbol: String },

    /// Close requested for a position that is not OPEN (or does not exist).
    #[error("position {position_id} is not open")]
    PositionNotOpen { position_id: i64 },

    /// The position exists but belongs to someone else.
    #[error("position {position_id} does not belong to tenant {tenant_id}")]
    ForeignPosition { position_id: i64, tenant_id: i64 },
}

/// Failures talking to the market-data provider. All of them are transient from
/// the scheduler's point of view.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// The symbol has no provider ticker.
    #[error("no data-provider ticker for {0}")]
    UnknownSymbol(String),

    /// Connection, TLS or timeout failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// Provider answered with a non-success status.
    #[error("provider returned HTTP {status} for {symbol}")]
    Status { symbol: String, status: u16 },

    /// Response body did not have the expected shape.
    #[error("unexpected response format: {0}")]
    Format(String),
}

impl From<GatewayError> for EngineError {
    fn from(err: GatewayError) -> Self {
        let symbol = match &err {
            GatewayError::UnknownSymbol(s) | GatewayError::Status { symbol: s, .. } => s.clone(),
            GatewayError::Transport(_) | GatewayError::Format(_) => String::new(),
        };
        Self::DataUnavailable {
            symbol,
            reason: err.to_string(),
        }
    }
}

impl EngineError {
    /// Creates a [`EngineError::DataUnavailable`] for `symbol`.
    pub fn data_unavailable(symbol: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DataUnavailable {
            symbol: symbol.into(),
            reason: reason.into(),
        }
    }

    /// Creates a [`EngineError::Store`] from any displayable error.
    pub fn store(err: impl std::fmt::Display) -> Self {
        Self::Store(err.to_string())
    }

    /// True for errors that only mean "skip and retry next cycle".
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::DataUnavailable { .. }
                | Self::InsufficientData { .. }
                | Self::ProviderUnavailable(_)
        )
    }

    /// True when a lifecycle rule was hit.
    #[must_use]
    pub const fn is_invariant_violation(&self) -> bool {
        matches!(self, Self::Invariant(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(EngineError::data_unavailable("EUR/USD", "empty").is_recoverable());
        assert!(EngineError::InsufficientData { required: 50, actual: 10 }.is_recoverable());

        let dup: EngineError = InvariantViolation::DuplicateOpenPosition {
            tenant_id: 1,
            symbol: "EUR/USD".to_string(),
        }
        .into();
        assert!(dup.is_invariant_violation());
        assert!(!dup.is_recoverable());
        assert!(!EngineError::store("disk full").is_recoverable());

        let gateway: EngineError = GatewayError::Status {
            symbol: "EUR/USD".to_string(),
            status: 503,
        }
        .into();
        assert!(gateway.is_recoverable());
        assert_eq!(
            gateway.to_string(),
            "market data unavailable for EUR/USD: provider returned HTTP 503 for EUR/USD"
        );
    }

    #[test]
    fn test_messages() {
        let err = EngineError::InsufficientData { required: 30, actual: 12 };
        assert_eq!(err.to_string(), "need at least 30 candles, got 12");

        let err: EngineError = InvariantViolation::PositionNotOpen { position_id: 7 }.into();
        assert_eq!(err.to_string(), "position 7 is not open");
    }
}
