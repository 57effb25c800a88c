//! Static instrument metadata: pip economics, quote precision and data-provider
//! tickers.
//!
//! Lookups are case-insensitive substring matches evaluated in a fixed order, so
//! `EUR/JPY` resolves as a JPY pair before any later rule is considered.

use serde::{Deserialize, Serialize};

/// Pip conventions for one instrument class.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InstrumentSpec {
    /// Smallest standard quoted increment
    pub pip_size: f64,
    /// Account-currency value of one pip for one standard lot
    pub pip_value: f64,
    /// Decimal places prices are quoted with
    pub decimals: u32,
}

const fn spec(pip_size: f64, pip_value: f64, decimals: u32) -> InstrumentSpec {
    InstrumentSpec {
        pip_size,
        pip_value,
        decimals,
    }
}

const STANDARD_FOREX: InstrumentSpec = spec(0.0001, 10.0, 5);

const SMALL_CRYPTO: [&str; 5] = ["XRP/USD", "ADA/USD", "DOGE/USD", "DOT/USD", "MATIC/USD"];
const MID_CRYPTO: [&str; 5] = ["SOL/USD", "BNB/USD", "LTC/USD", "AVAX/USD", "LINK/USD"];
const INDICES: [&str; 8] = [
    "US500", "US100", "US30", "DE40", "UK100", "JP225", "AU200", "EU50",
];
const EXOTIC_CURRENCIES: [&str; 8] = ["MXN", "ZAR", "TRY", "SEK", "NOK", "DKK", "HKD", "SGD"];

impl InstrumentSpec {
    /// Looks up the pip conventions for `symbol`.
    #[must_use]
    pub fn for_symbol(symbol: &str) -> Self {
        let s = symbol.trim().to_ascii_uppercase();
        let has = |needle: &str| s.contains(needle);

        if has("JPY") {
            spec(0.01, 10.0, 3)
        } else if has("XAU") || has("GOLD") {
            spec(0.01, 1.0, 2)
        } else if has("XAG") || has("SILVER") {
            spec(0.001, 5.0, 3)
        } else if has("PLAT") {
            spec(0.1, 1.0, 2)
        } else if has("COPPER") {
            spec(0.0001, 1.0, 4)
        } else if has("WTI") || has("BRENT") || s == "CL" || s == "BZ" {
            spec(0.01, 10.0, 2)
        } else if has("NGAS") || s == "NG" {
            spec(0.001, 10.0, 3)
        } else if has("BTC") {
            spec(1.0, 1.0, 2)
        } else if has("ETH") {
            spec(0.01, 1.0, 2)
        } else if SMALL_CRYPTO.contains(&s.as_str()) {
            spec(0.0001, 1.0, 4)
        } else if MID_CRYPTO.contains(&s.as_str()) {
            spec(0.01, 1.0, 2)
        } else if INDICES.iter().any(|idx| has(idx)) {
            spec(0.1, 1.0, 2)
        } else if has("VIX") {
            spec(0.01, 1.0, 2)
        } else if EXOTIC_CURRENCIES.iter().any(|ccy| has(ccy)) {
            spec(0.0001, 10.0, 5)
        } else {
            STANDARD_FOREX
        }
    }

    /// Rounds `price` to this instrument's quote precision.
    #[must_use]
    pub fn round_price(&self, price: f64) -> f64 {
        round_to(price, self.decimals)
    }

    /// Converts a price distance into pips.
    #[must_use]
    pub fn to_pips(&self, distance: f64) -> f64 {
        distance.abs() / self.pip_size
    }
}

impl Default for InstrumentSpec {
    fn default() -> Self {
        STANDARD_FOREX
    }
}

/// Rounds half away from zero to `decimals` places.
#[must_use]
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(i32::try_from(decimals).unwrap_or(i32::MAX));
    (value * factor).round() / factor
}

/// Formats a price with the decimals of `symbol`.
#[must_use]
pub fn format_price(price: f64, symbol: &str) -> f64 {
    InstrumentSpec::for_symbol(symbol).round_price(price)
}

/// Maximum stop distance, in pips, accepted by lot sizing.
#[must_use]
pub fn stop_pip_cap(symbol: &str) -> f64 {
    if symbol.to_ascii_uppercase().contains("BTC") {
        5000.0
    } else {
        500.0
    }
}

/// Gold and bitcoin quote with wide stops; everything else uses forex-style bounds.
#[must_use]
pub fn uses_wide_stops(symbol: &str) -> bool {
    let s = symbol.to_ascii_uppercase();
    s.contains("XAU") || s.contains("BTC")
}

const TICKERS: &[(&str, &str)] = &[
    // majors
    ("EUR/USD", "EURUSD=X"),
    ("GBP/USD", "GBPUSD=X"),
    ("USD/JPY", "USDJPY=X"),
    ("USD/CHF", "USDCHF=X"),
    ("AUD/USD", "AUDUSD=X"),
    ("USD/CAD", "USDCAD=X"),
    ("NZD/USD", "NZDUSD=X"),
    // crosses
    ("EUR/GBP", "EURGBP=X"),
    ("EUR/JPY", "EURJPY=X"),
    ("EUR/AUD", "EURAUD=X"),
    ("EUR/CAD", "EURCAD=X"),
    ("EUR/CHF", "EURCHF=X"),
    ("EUR/NZD", "EURNZD=X"),
    ("GBP/JPY", "GBPJPY=X"),
    ("GBP/AUD", "GBPAUD=X"),
    ("GBP/CAD", "GBPCAD=X"),
    ("GBP/CHF", "GBPCHF=X"),
    ("GBP/NZD", "GBPNZD=X"),
    ("AUD/JPY", "AUDJPY=X"),
    ("AUD/CAD", "AUDCAD=X"),
    ("AUD/CHF", "AUDCHF=X"),
    ("AUD/NZD", "AUDNZD=X"),
    ("CAD/JPY", "CADJPY=X"),
    ("CAD/CHF", "CADCHF=X"),
    ("CHF/JPY", "CHFJPY=X"),
    ("NZD/JPY", "NZDJPY=X"),
    ("NZD/CAD", "NZDCAD=X"),
    ("NZD/CHF", "NZDCHF=X"),
    // exotics
    ("USD/SGD", "USDSGD=X"),
    ("USD/HKD", "USDHKD=X"),
    ("USD/MXN", "USDMXN=X"),
    ("USD/ZAR", "USDZAR=X"),
    ("USD/TRY", "USDTRY=X"),
    ("USD/SEK", "USDSEK=X"),
    ("USD/NOK", "USDNOK=X"),
    ("USD/DKK", "USDDKK=X"),
    ("EUR/SEK", "EURSEK=X"),
    ("EUR/NOK", "EURNOK=X"),
    ("EUR/TRY", "EURTRY=X"),
    // commodities
    ("XAU/USD", "GC=F"),
    ("XAG/USD", "SI=F"),
    ("WTI/USD", "CL=F"),
    ("BRENT", "BZ=F"),
    ("NGAS", "NG=F"),
    ("COPPER", "HG=F"),
    ("PLAT", "PL=F"),
    // crypto
    ("BTC/USD", "BTC-USD"),
    ("ETH/USD", "ETH-USD"),
    ("XRP/USD", "XRP-USD"),
    ("SOL/USD", "SOL-USD"),
    ("BNB/USD", "BNB-USD"),
    ("ADA/USD", "ADA-USD"),
    ("DOGE/USD", "DOGE-USD"),
    ("DOT/USD", "DOT-USD"),
    ("MATIC/USD", "MATIC-USD"),
    ("LTC/USD", "LTC-USD"),
    ("AVAX/USD", "AVAX-USD"),
    ("LINK/USD", "LINK-USD"),
    // indices
    ("US500", "ES=F"),
    ("US100", "NQ=F"),
    ("US30", "YM=F"),
    ("DE40", "GDAXI"),
    ("UK100", "^FTSE"),
    ("JP225", "^N225"),
    ("AU200", "^AXJO"),
    ("EU50", "^STOXX50E"),
    ("VIX", "^VIX"),
];

/// Data-provider ticker for a platform symbol, e.g. `EUR/USD` -> `EURUSD=X`.
#[must_use]
pub fn ticker_for(symbol: &str) -> Option<&'static str> {
    let symbol = symbol.trim();
    TICKERS
        .iter()
        .find(|(s, _)| s.eq_ignore_ascii_case(symbol))
        .map(|(_, ticker)| *ticker)
}

/// Every symbol with a known ticker.
pub fn known_symbols() -> impl Iterator<Item = &'static str> {
    TICKERS.iter().map(|(s, _)| *s)
}
