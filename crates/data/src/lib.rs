//! Persistence and market data for the autotrader engine.
//!
//! This crate provides:
//! - [`SqliteStore`], the [`autotrader_core::TradeStore`] over `SQLite` with
//!   embedded migrations
//! - [`YahooGateway`], the [`autotrader_core::MarketDataGateway`] over the Yahoo
//!   chart API

pub mod sqlite_store;
pub mod yahoo;

pub use sqlite_store::SqliteStore;
pub use yahoo::YahooGateway;
