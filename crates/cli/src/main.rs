use anyhow::Context;
use autotrader_backtest::{simulate_portfolio, SimulationConfig};
use autotrader_core::{
    AccountRisk, AppConfig, ConfigLoader, MarketDataGateway, Notifier, PositionId, TenantId,
    TradeStore,
};
use autotrader_data::{SqliteStore, YahooGateway};
use autotrader_scheduler::{
    AutoTrader, LogNotifier, Operations, PositionMonitor, Scanner, TelegramNotifier,
};
use autotrader_strategy::{analyze_all, analyze_pair, ProviderRegistry};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "autotrader")]
#[command(
    about = "Signal engine and simulated auto-trader for forex, metals and crypto",
    long_about = None
)]
struct Cli {
    /// Config file path
    #[arg(short, long, global = true, default_value = "config/Config.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scan and monitor loops until Ctrl+C
    Run,
    /// Scan one tenant once
    Scan {
        #[arg(short, long)]
        tenant: TenantId,
    },
    /// Check every open position once
    Monitor,
    /// Run every strategy and the ensemble over one instrument
    Analyze {
        /// Instrument, e.g. "EUR/USD"
        #[arg(short, long)]
        symbol: String,
        /// Chart range (defaults to the configured analysis period)
        #[arg(long)]
        period: Option<String>,
        /// Bar interval (defaults to the configured analysis interval)
        #[arg(long)]
        interval: Option<String>,
        #[arg(long, default_value_t = 10_000.0)]
        balance: f64,
        /// Percent of balance risked per trade
        #[arg(long, default_value_t = 1.0)]
        risk: f64,
    },
    /// Statistical-arbitrage check of two instruments
    Pairs {
        #[arg(long)]
        first: String,
        #[arg(long)]
        second: String,
        #[arg(long, default_value = "3mo")]
        period: String,
        #[arg(long, default_value = "1d")]
        interval: String,
    },
    /// Walk-forward replay of the ensemble over history
    Simulate {
        /// Comma-separated instruments
        #[arg(
            long,
            value_delimiter = ',',
            default_value = "EUR/USD,GBP/USD,USD/JPY,XAU/USD,BTC/USD"
        )]
        symbols: Vec<String>,
        #[arg(long, default_value = "3mo")]
        period: String,
        #[arg(long, default_value = "1d")]
        interval: String,
    },
    /// Execution statistics of a tenant
    Stats {
        #[arg(short, long)]
        tenant: TenantId,
    },
    /// Show or change tenant settings
    Settings {
        #[arg(short, long)]
        tenant: TenantId,
        /// `key=value` override, repeatable
        #[arg(long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,
    },
    /// Recent positions of a tenant
    Positions {
        #[arg(short, long)]
        tenant: TenantId,
        #[arg(short, long)]
        limit: Option<u32>,
    },
    /// Recent audit log of a tenant
    Logs {
        #[arg(short, long)]
        tenant: TenantId,
        #[arg(short, long)]
        limit: Option<u32>,
    },
    /// Close an open position at the market price
    Close {
        #[arg(short, long)]
        tenant: TenantId,
        #[arg(short, long)]
        position: PositionId,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = ConfigLoader::load_from(&cli.config)?;

    match cli.command {
        Commands::Run => run_service(config).await?,
        Commands::Scan { tenant } => {
            let app = App::open(config).await?;
            print_json(&app.scanner().scan_tenant(tenant).await?)?;
        }
        Commands::Monitor => {
            let app = App::open(config).await?;
            print_json(&app.monitor().tick().await?)?;
        }
        Commands::Analyze {
            symbol,
            period,
            interval,
            balance,
            risk,
        } => {
            let gateway = YahooGateway::new(config.market_data.clone())?;
            let period = period.unwrap_or_else(|| config.market_data.analysis_period.clone());
            let interval = interval.unwrap_or_else(|| config.market_data.analysis_interval.clone());
            let series = gateway.fetch(&symbol, &period, &interval).await?;
            if series.is_empty() {
                anyhow::bail!("no market data for {symbol}");
            }
            let risk = AccountRisk::new(balance, risk, symbol.as_str());
            print_json(&analyze_all(&series, &risk, &config.strategy))?;
        }
        Commands::Pairs {
            first,
            second,
            period,
            interval,
        } => {
            let gateway = YahooGateway::new(config.market_data.clone())?;
            let a = gateway.fetch(&first, &period, &interval).await?;
            let b = gateway.fetch(&second, &period, &interval).await?;
            print_json(&analyze_pair(a.closes(), b.closes(), &first, &second)?)?;
        }
        Commands::Simulate {
            symbols,
            period,
            interval,
        } => run_simulation(config, &symbols, &period, &interval).await?,
        Commands::Stats { tenant } => {
            let app = App::open(config).await?;
            print_json(&app.operations().stats(tenant).await?)?;
        }
        Commands::Settings { tenant, set } => {
            let app = App::open(config).await?;
            let ops = app.operations();
            let mut settings = ops.settings(tenant).await?;
            if !set.is_empty() {
                for pair in &set {
                    let (key, value) = parse_setting(pair)?;
                    settings.apply(key, value)?;
                }
                ops.update_settings(tenant, &settings).await?;
                tracing::info!(tenant_id = tenant, changes = set.len(), "Settings updated");
            }
            print_json(&settings)?;
        }
        Commands::Positions { tenant, limit } => {
            let app = App::open(config).await?;
            print_json(&app.operations().recent_positions(tenant, limit).await?)?;
        }
        Commands::Logs { tenant, limit } => {
            let app = App::open(config).await?;
            print_json(&app.operations().recent_logs(tenant, limit).await?)?;
        }
        Commands::Close { tenant, position } => {
            let app = App::open(config).await?;
            print_json(&app.operations().close_manually(tenant, position).await?)?;
        }
    }

    Ok(())
}

/// Store, gateway and notifier built from configuration.
struct App {
    config: AppConfig,
    store: Arc<SqliteStore>,
    gateway: Arc<YahooGateway>,
    notifier: Arc<dyn Notifier>,
}

impl App {
    async fn open(config: AppConfig) -> anyhow::Result<Self> {
        ensure_sqlite_dir(&config.database.url)?;
        let store = SqliteStore::connect(&config.database.url, config.database.max_connections)
            .await
            .with_context(|| format!("opening database {}", config.database.url))?
            .with_initial_balance(config.trading.default_balance);
        let gateway = YahooGateway::new(config.market_data.clone())?;

        let notifier: Arc<dyn Notifier> = if config.notifications.telegram_chats.is_empty() {
            tracing::info!("No Telegram chats configured, notifications go to the log");
            Arc::new(LogNotifier)
        } else {
            Arc::new(TelegramNotifier::new(config.notifications.clone())?)
        };

        Ok(Self {
            config,
            store: Arc::new(store),
            gateway: Arc::new(gateway),
            notifier,
        })
    }

    fn scanner(&self) -> Scanner {
        Scanner::new(
            self.store.clone(),
            self.gateway.clone(),
            ProviderRegistry::new(self.config.strategy.clone(), self.config.scoring.clone()),
            Arc::clone(&self.notifier),
            self.config.market_data.clone(),
            self.config.trading.clone(),
        )
    }

    fn monitor(&self) -> PositionMonitor {
        PositionMonitor::new(
            self.store.clone(),
            self.gateway.clone(),
            Arc::clone(&self.notifier),
        )
    }

    fn operations(&self) -> Operations {
        Operations::new(
            self.store.clone(),
            self.gateway.clone(),
            Arc::clone(&self.notifier),
            self.config.scheduler.clone(),
        )
    }
}

async fn run_service(config: AppConfig) -> anyhow::Result<()> {
    let app = App::open(config).await?;
    let handle = AutoTrader::new(
        Arc::new(app.scanner()),
        Arc::new(app.monitor()),
        app.config.scheduler.clone(),
    )
    .start();

    tokio::signal::ctrl_c().await?;
    tracing::info!("Received Ctrl+C, waiting for running iterations to finish");
    handle.shutdown().await?;

    let open_positions = app.store.open_positions().await.map_or(0, |p| p.len());
    tracing::info!(open_positions, "Auto-trader exited");
    Ok(())
}

async fn run_simulation(
    config: AppConfig,
    symbols: &[String],
    period: &str,
    interval: &str,
) -> anyhow::Result<()> {
    let gateway = YahooGateway::new(config.market_data.clone())?;
    let mut series_by_symbol = Vec::with_capacity(symbols.len());
    for symbol in symbols {
        match gateway.fetch(symbol, period, interval).await {
            Ok(series) => series_by_symbol.push((symbol.clone(), series)),
            Err(e) => tracing::warn!(symbol = %symbol, error = %e, "Skipping instrument"),
        }
    }

    let sim = SimulationConfig {
        initial_balance: config.trading.default_balance,
        risk_percent: config.trading.risk_percent,
        strategy: config.strategy,
        ..SimulationConfig::default()
    };
    print_json(&simulate_portfolio(&series_by_symbol, &sim))
}

fn parse_setting(pair: &str) -> anyhow::Result<(&str, &str)> {
    pair.split_once('=')
        .with_context(|| format!("expected KEY=VALUE, got {pair}"))
}

/// Creates the parent directory of a file-backed `SQLite` URL.
fn ensure_sqlite_dir(url: &str) -> anyhow::Result<()> {
    let Some(file_path) = url.strip_prefix("sqlite://") else {
        return Ok(());
    };
    let file_path = file_path.split('?').next().unwrap_or(file_path);
    if file_path.starts_with(':') {
        return Ok(());
    }
    if let Some(parent) = std::path::Path::new(file_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
    }
    Ok(())
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_setting() {
        assert_eq!(
            parse_setting("probability_threshold=70").unwrap(),
            ("probability_threshold", "70")
        );
        assert_eq!(
            parse_setting("watched_instruments=EUR/USD,GBP/USD").unwrap(),
            ("watched_instruments", "EUR/USD,GBP/USD")
        );
        assert!(parse_setting("enabled").is_err());
    }

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::try_parse_from([
            "autotrader",
            "settings",
            "--tenant",
            "3",
            "--set",
            "enabled=true",
            "--set",
            "auto_execute=1",
        ])
        .unwrap();
        match cli.command {
            Commands::Settings { tenant, set } => {
                assert_eq!(tenant, 3);
                assert_eq!(set, vec!["enabled=true", "auto_execute=1"]);
            }
            _ => panic!("expected settings"),
        }
        assert_eq!(cli.config, "config/Config.toml");

        let cli = Cli::try_parse_from(["autotrader", "simulate", "--symbols", "EUR/USD,XAU/USD"])
            .unwrap();
        match cli.command {
            Commands::Simulate { symbols, period, .. } => {
                assert_eq!(symbols, vec!["EUR/USD", "XAU/USD"]);
                assert_eq!(period, "3mo");
            }
            _ => panic!("expected simulate"),
        }

        assert!(Cli::try_parse_from(["autotrader", "close", "--tenant", "1"]).is_err());
    }

    #[test]
    fn test_sqlite_dir_skips_memory_urls() {
        assert!(ensure_sqlite_dir("sqlite::memory:").is_ok());
        assert!(ensure_sqlite_dir("sqlite://:memory:").is_ok());
        assert!(ensure_sqlite_dir("postgres://localhost/db").is_ok());
    }
}
