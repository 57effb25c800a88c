use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub scheduler: SchedulerConfig,
    pub market_data: MarketDataConfig,
    pub notifications: NotificationConfig,
    pub strategy: StrategyConfig,
    pub scoring: ScoringConfig,
    pub trading: TradingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://data/autotrader.db".to_string(),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub scan_interval_secs: u64,
    pub monitor_interval_secs: u64,
    pub recent_positions_limit: u32,
    pub recent_logs_limit: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            scan_interval_secs: 30 * 60,
            monitor_interval_secs: 60,
            recent_positions_limit: 50,
            recent_logs_limit: 100,
        }
    }
}

/// Chart API endpoint and the period/interval pairs used for each kind of fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketDataConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub user_agent: String,
    /// Client-side rate limit on chart requests
    pub requests_per_minute: u32,
    pub analysis_period: String,
    pub analysis_interval: String,
    pub price_period: String,
    pub price_interval: String,
    pub fallback_period: String,
    pub fallback_interval: String,
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        Self {
            base_url: "https://query1.finance.yahoo.com".to_string(),
            timeout_secs: 30,
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) autotrader/0.1".to_string(),
            requests_per_minute: 120,
            analysis_period: "1mo".to_string(),
            analysis_interval: "1h".to_string(),
            price_period: "1d".to_string(),
            price_interval: "1m".to_string(),
            fallback_period: "5d".to_string(),
            fallback_interval: "1h".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub telegram_api_base: String,
    pub timeout_secs: u64,
    /// Per-tenant credentials keyed by tenant id
    pub telegram_chats: HashMap<String, TelegramChat>,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            telegram_api_base: "https://api.telegram.org".to_string(),
            timeout_secs: 30,
            telegram_chats: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelegramChat {
    pub bot_token: String,
    pub chat_id: String,
}

/// Ensemble weights and thresholds plus the mean-reversion RSI bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    pub momentum_weight: f64,
    pub mean_reversion_weight: f64,
    pub breakout_weight: f64,
    pub volatility_weight: f64,
    /// Winning side must beat the other by more than this
    pub ensemble_margin: f64,
    /// Winning side must reach at least this
    pub ensemble_floor: f64,
    pub ensemble_stop_atr: f64,
    pub ensemble_target_atr: f64,
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            momentum_weight: 0.30,
            mean_reversion_weight: 0.25,
            breakout_weight: 0.25,
            volatility_weight: 0.20,
            ensemble_margin: 20.0,
            ensemble_floor: 40.0,
            ensemble_stop_atr: 2.0,
            ensemble_target_atr: 3.0,
            rsi_oversold: 30.0,
            rsi_overbought: 70.0,
        }
    }
}

/// Heuristic constants of the execution-probability score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub agreement_points: f64,
    pub agreement_cap: f64,
    pub risk_reward_multiplier: f64,
    pub risk_reward_cap: f64,
    pub confidence_weight: f64,
    pub volatility_baseline: f64,
    pub min_probability: f64,
    pub max_probability: f64,
    pub strong_agreement: f64,
    pub good_risk_reward: f64,
    pub high_confidence: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            agreement_points: 15.0,
            agreement_cap: 30.0,
            risk_reward_multiplier: 8.0,
            risk_reward_cap: 20.0,
            confidence_weight: 0.4,
            volatility_baseline: 10.0,
            min_probability: 5.0,
            max_probability: 95.0,
            strong_agreement: 20.0,
            good_risk_reward: 2.0,
            high_confidence: 70.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TradingConfig {
    /// Percent of balance risked per scanned trade
    pub risk_percent: f64,
    /// Balance assumed for tenants without an account row
    pub default_balance: Decimal,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            risk_percent: 1.0,
            default_balance: Decimal::from(10_000),
        }
    }
}
