use crate::config::AppConfig;
use anyhow::Result;
use figment::{
    providers::{Env, Format, Json, Serialized, Toml},
    Figment,
};
use std::path::Path;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads configuration from `config/Config.toml`, `AUTOTRADER_*` environment
    /// variables and `config/Config.json`, over built-in defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a present configuration source cannot be parsed.
    pub fn load() -> Result<AppConfig> {
        Self::load_from("config/Config.toml")
    }

    /// Same as [`ConfigLoader::load`] with an explicit TOML path.
    ///
    /// # Errors
    ///
    /// Returns an error if a present configuration source cannot be parsed.
    pub fn load_from(toml_path: impl AsRef<Path>) -> Result<AppConfig> {
        let config: AppConfig = Self::figment(toml_path.as_ref()).extract()?;
        tracing::debug!(
            path = %toml_path.as_ref().display(),
            database = %config.database.url,
            scan_secs = config.scheduler.scan_interval_secs,
            monitor_secs = config.scheduler.monitor_interval_secs,
            "Configuration loaded"
        );
        Ok(config)
    }

    fn figment(toml_path: &Path) -> Figment {
        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(toml_path))
            .merge(Env::prefixed("AUTOTRADER_").split("__"))
            .join(Json::file("config/Config.json"))
    }

    /// Parses configuration from a TOML string over defaults. Environment and JSON
    /// sources are not consulted.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or has the wrong shape.
    pub fn from_toml_str(toml: &str) -> Result<AppConfig> {
        let config: AppConfig = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::string(toml))
            .extract()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = ConfigLoader::from_toml_str("").unwrap();
        assert_eq!(config.scheduler.scan_interval_secs, 1800);
        assert_eq!(config.scheduler.monitor_interval_secs, 60);
        assert!((config.scoring.confidence_weight - 0.4).abs() < f64::EPSILON);
        assert!((config.strategy.momentum_weight - 0.30).abs() < f64::EPSILON);
        assert_eq!(config.trading.default_balance, dec!(10000));
    }

    #[test]
    fn test_partial_override() {
        let config = ConfigLoader::from_toml_str(
            r#"
            [scheduler]
            monitor_interval_secs = 15

            [scoring]
            volatility_baseline = 0.0

            [notifications.telegram_chats.7]
            bot_token = "abc"
            chat_id = "42"
            "#,
        )
        .unwrap();

        assert_eq!(config.scheduler.monitor_interval_secs, 15);
        assert_eq!(config.scheduler.scan_interval_secs, 1800);
        assert!(config.scoring.volatility_baseline.abs() < f64::EPSILON);
        assert!((config.scoring.agreement_points - 15.0).abs() < f64::EPSILON);
        assert_eq!(config.notifications.telegram_chats["7"].chat_id, "42");
    }

    #[test]
    fn test_missing_file_is_not_an_error() {
        let config = ConfigLoader::load_from("does/not/exist.toml").unwrap();
        assert_eq!(config.database.max_connections, 5);
    }
}
