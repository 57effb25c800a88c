//! Yahoo Finance chart API gateway.
//!
//! Fetches OHLC bars from the v8 chart endpoint, drops bars with missing
//! values, and rate-limits requests client-side.

use async_trait::async_trait;
use autotrader_core::{ticker_for, CandleSeries, GatewayError, MarketDataConfig, MarketDataGateway};
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::Deserialize;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct QuoteData {
    open: Vec<Option<f64>>,
    high: Vec<Option<f64>>,
    low: Vec<Option<f64>>,
    close: Vec<Option<f64>>,
}

type DirectRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Market data gateway backed by the Yahoo v8 chart API.
pub struct YahooGateway {
    config: MarketDataConfig,
    http: Client,
    rate_limiter: Arc<DirectRateLimiter>,
}

impl std::fmt::Debug for YahooGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YahooGateway")
            .field("base_url", &self.config.base_url)
            .field("requests_per_minute", &self.config.requests_per_minute)
            .finish_non_exhaustive()
    }
}

impl YahooGateway {
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn new(config: MarketDataConfig) -> Result<Self, GatewayError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| GatewayError::Transport(format!("failed to build HTTP client: {e}")))?;

        let per_minute = NonZeroU32::new(config.requests_per_minute).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_minute(per_minute)));

        Ok(Self {
            config,
            http,
            rate_limiter,
        })
    }

    /// Sets a custom base URL (useful for testing).
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    #[must_use]
    pub const fn config(&self) -> &MarketDataConfig {
        &self.config
    }

    /// Candles for the configured analysis window.
    ///
    /// # Errors
    /// Same as [`MarketDataGateway::fetch`].
    pub async fn fetch_for_analysis(&self, symbol: &str) -> Result<CandleSeries, GatewayError> {
        self.fetch(
            symbol,
            &self.config.analysis_period,
            &self.config.analysis_interval,
        )
        .await
    }

    async fn get_chart(
        &self,
        symbol: &str,
        ticker: &str,
        period: &str,
        interval: &str,
    ) -> Result<ChartResponse, GatewayError> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}/v8/finance/chart/{}", self.config.base_url, ticker);
        tracing::debug!("GET {} range={} interval={}", url, period, interval);

        let response = self
            .http
            .get(&url)
            .query(&[("range", period), ("interval", interval)])
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Status {
                symbol: symbol.to_string(),
                status: status.as_u16(),
            });
        }

        response
            .json::<ChartResponse>()
            .await
            .map_err(|e| GatewayError::Format(e.to_string()))
    }
}

/// Converts a chart response into a series, keeping only complete bars.
fn parse_chart(symbol: &str, response: ChartResponse) -> Result<CandleSeries, GatewayError> {
    let Some(result) = response.chart.result else {
        return match response.chart.error {
            Some(err) if err.code != "Not Found" => Err(GatewayError::Format(format!(
                "{symbol}: {}: {}",
                err.code, err.description
            ))),
            _ => Ok(CandleSeries::default()),
        };
    };

    let Some(data) = result.into_iter().next() else {
        return Ok(CandleSeries::default());
    };
    if data.timestamp.as_ref().is_some_and(Vec::is_empty) {
        return Ok(CandleSeries::default());
    }
    let quote = data.indicators.quote.into_iter().next().unwrap_or_default();

    let n = quote.close.len();
    let mut opens = Vec::with_capacity(n);
    let mut highs = Vec::with_capacity(n);
    let mut lows = Vec::with_capacity(n);
    let mut closes = Vec::with_capacity(n);
    for i in 0..n {
        let bar = (
            quote.open.get(i).copied().flatten(),
            quote.high.get(i).copied().flatten(),
            quote.low.get(i).copied().flatten(),
            quote.close.get(i).copied().flatten(),
        );
        if let (Some(o), Some(h), Some(l), Some(c)) = bar {
            opens.push(o);
            highs.push(h);
            lows.push(l);
            closes.push(c);
        }
    }

    CandleSeries::from_columns(opens, highs, lows, closes)
        .map_err(|e| GatewayError::Format(e.to_string()))
}

#[async_trait]
impl MarketDataGateway for YahooGateway {
    async fn fetch(
        &self,
        symbol: &str,
        period: &str,
        interval: &str,
    ) -> Result<CandleSeries, GatewayError> {
        let ticker =
            ticker_for(symbol).ok_or_else(|| GatewayError::UnknownSymbol(symbol.to_string()))?;
        let response = self.get_chart(symbol, ticker, period, interval).await?;
        let series = parse_chart(symbol, response)?;
        if series.is_empty() {
            tracing::info!(symbol, ticker, period, interval, "Chart API returned no bars");
        }
        Ok(series)
    }

    async fn latest_price(&self, symbol: &str) -> Result<Option<f64>, GatewayError> {
        let c = &self.config;
        let series = self.fetch(symbol, &c.price_period, &c.price_interval).await?;
        if let Some(price) = series.last_close() {
            return Ok(Some(price));
        }
        Ok(self
            .fetch(symbol, &c.fallback_period, &c.fallback_interval)
            .await?
            .last_close())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn chart(closes: &serde_json::Value) -> serde_json::Value {
        json!({
            "chart": {
                "result": [{
                    "timestamp": [1_700_000_000, 1_700_003_600, 1_700_007_200],
                    "indicators": {
                        "quote": [{
                            "open":  [1.10, null, 1.12],
                            "high":  [1.11, 1.12, 1.13],
                            "low":   [1.09, 1.10, 1.11],
                            "close": closes
                        }]
                    }
                }],
                "error": null
            }
        })
    }

    fn gateway(server: &MockServer) -> YahooGateway {
        YahooGateway::new(MarketDataConfig::default())
            .unwrap()
            .with_base_url(server.uri())
    }

    #[tokio::test]
    async fn test_fetch_drops_incomplete_bars() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v8/finance/chart/EURUSD=X"))
            .and(query_param("range", "1mo"))
            .and(query_param("interval", "1h"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(chart(&json!([1.105, 1.115, 1.125]))),
            )
            .mount(&mock_server)
            .await;

        let series = gateway(&mock_server)
            .fetch_for_analysis("EUR/USD")
            .await
            .unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.closes(), &[1.105, 1.125]);
        assert_eq!(series.opens(), &[1.10, 1.12]);
    }

    #[tokio::test]
    async fn test_latest_price_falls_back_to_hourly() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v8/finance/chart/GC=F"))
            .and(query_param("interval", "1m"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "chart": {"result": [{"timestamp": [], "indicators": {"quote": [{}]}}], "error": null}
            })))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v8/finance/chart/GC=F"))
            .and(query_param("range", "5d"))
            .and(query_param("interval", "1h"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(chart(&json!([2000.5, null, 2010.25]))),
            )
            .mount(&mock_server)
            .await;

        let price = gateway(&mock_server).latest_price("XAU/USD").await.unwrap();
        assert_eq!(price, Some(2010.25));
    }

    #[tokio::test]
    async fn test_not_found_is_an_empty_series() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v8/finance/chart/GBPUSD=X"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "chart": {
                    "result": null,
                    "error": {"code": "Not Found", "description": "No data found, symbol may be delisted"}
                }
            })))
            .mount(&mock_server)
            .await;

        let gw = gateway(&mock_server);
        assert!(gw.fetch("GBP/USD", "1d", "1m").await.unwrap().is_empty());
        assert_eq!(gw.latest_price("GBP/USD").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_http_error_is_a_status_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let err = gateway(&mock_server)
            .fetch("EUR/USD", "1d", "1m")
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Status { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_unknown_symbol_makes_no_request() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;

        let err = gateway(&mock_server)
            .fetch("FOO/BAR", "1d", "1m")
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::UnknownSymbol(_)));
    }

    #[tokio::test]
    async fn test_garbled_body_is_a_format_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>captcha</html>"))
            .mount(&mock_server)
            .await;

        let err = gateway(&mock_server)
            .fetch("EUR/USD", "1d", "1m")
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Format(_)));
    }
}
