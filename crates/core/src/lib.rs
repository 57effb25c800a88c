pub mod candles;
pub mod config;
pub mod config_loader;
pub mod error;
pub mod instrument;
pub mod position;
pub mod position_sizing;
pub mod settings;
pub mod signal;
pub mod traits;

pub use candles::{Candle, CandleSeries};
pub use config::{
    AppConfig, DatabaseConfig, MarketDataConfig, NotificationConfig, SchedulerConfig,
    ScoringConfig, StrategyConfig, TelegramChat, TradingConfig,
};
pub use config_loader::ConfigLoader;
pub use error::{EngineError, GatewayError, InvariantViolation};
pub use instrument::{format_price, ticker_for, InstrumentSpec};
pub use position::{
    CloseRequest, ClosedPosition, ExitReason, ManualTrade, NewPosition, Position, PositionId,
    PositionStatus, TenantId,
};
pub use position_sizing::{calculate_lot_size, calculate_sl_tp_levels, risk_reward};
pub use settings::{ExecutionLogEntry, LogAction, SignalMethod, TenantSettings, TenantStats};
pub use signal::{AccountRisk, Direction, OutcomeStatus, ProviderSignal, Signal, StrategyOutcome};
pub use traits::{MarketDataGateway, Notifier, SignalProvider, TradeStore};
