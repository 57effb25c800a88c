//! Technical primitives over price slices.
//!
//! Everything here is a pure function of its inputs. Two families exist where the
//! strategies and the classic indicator definitions disagree:
//! [`ema`]/[`rsi`] are the forms the strategies use (first-price seeded EMA,
//! simple-average RSI) while [`ema_sma_seeded`]/[`rsi_wilder`] follow the textbook
//! recurrences.

use serde::{Deserialize, Serialize};

/// Fraction of the last close used as ATR when history is too short.
pub const ATR_FALLBACK_FRACTION: f64 = 0.001;

#[allow(clippy::cast_precision_loss)]
fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Simple moving average of the last `period` values.
#[must_use]
pub fn sma(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period {
        return None;
    }
    Some(mean(&prices[prices.len() - period..]))
}

#[allow(clippy::cast_precision_loss)]
fn ema_alpha(period: usize) -> f64 {
    2.0 / (period as f64 + 1.0)
}

/// EMA seeded with the first price and run over the whole slice.
///
/// With fewer than `period` prices the last price is returned unchanged; an empty
/// slice yields 0.
#[must_use]
pub fn ema(prices: &[f64], period: usize) -> f64 {
    let Some((&first, rest)) = prices.split_first() else {
        return 0.0;
    };
    if prices.len() < period {
        return prices[prices.len() - 1];
    }
    let alpha = ema_alpha(period);
    rest.iter()
        .fold(first, |acc, &price| price * alpha + acc * (1.0 - alpha))
}

/// EMA seeded with the SMA of the first `period` prices.
#[must_use]
pub fn ema_sma_seeded(prices: &[f64], period: usize) -> Option<f64> {
    ema_sma_seeded_series(prices, period).last().copied()
}

/// Every value of the SMA-seeded EMA, starting at index `period - 1`.
fn ema_sma_seeded_series(prices: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || prices.len() < period {
        return Vec::new();
    }
    let alpha = ema_alpha(period);
    let mut out = Vec::with_capacity(prices.len() - period + 1);
    let mut value = mean(&prices[..period]);
    out.push(value);
    for &price in &prices[period..] {
        value = price * alpha + value * (1.0 - alpha);
        out.push(value);
    }
    out
}

fn gains_and_losses(prices: &[f64]) -> (Vec<f64>, Vec<f64>) {
    prices
        .windows(2)
        .map(|w| {
            let change = w[1] - w[0];
            (change.max(0.0), (-change).max(0.0))
        })
        .unzip()
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    100.0 - 100.0 / (1.0 + rs)
}

/// RSI from the simple mean of the last `period` gains and losses.
///
/// Returns 50 (neutral) when there are fewer than `period + 1` prices and 100 when
/// the average loss is exactly zero.
#[must_use]
pub fn rsi(prices: &[f64], period: usize) -> f64 {
    if period == 0 || prices.len() < period + 1 {
        return 50.0;
    }
    let (gains, losses) = gains_and_losses(prices);
    let avg_gain = mean(&gains[gains.len() - period..]);
    let avg_loss = mean(&losses[losses.len() - period..]);
    rsi_from_averages(avg_gain, avg_loss)
}

/// Wilder-smoothed RSI.
#[must_use]
pub fn rsi_wilder(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period + 1 {
        return None;
    }
    let (gains, losses) = gains_and_losses(prices);
    let mut avg_gain = mean(&gains[..period]);
    let mut avg_loss = mean(&losses[..period]);
    #[allow(clippy::cast_precision_loss)]
    let n = period as f64;
    for i in period..gains.len() {
        avg_gain = (avg_gain * (n - 1.0) + gains[i]) / n;
        avg_loss = (avg_loss * (n - 1.0) + losses[i]) / n;
    }
    Some(rsi_from_averages(avg_gain, avg_loss))
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

/// Bollinger Bands with population standard deviation.
#[must_use]
pub fn bollinger(prices: &[f64], period: usize, width: f64) -> Option<Bands> {
    let middle = sma(prices, period)?;
    let window = &prices[prices.len() - period..];
    let variance = mean(
        &window
            .iter()
            .map(|p| (p - middle).powi(2))
            .collect::<Vec<_>>(),
    );
    let std = variance.sqrt();
    Some(Bands {
        upper: middle + width * std,
        middle,
        lower: middle - width * std,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Macd {
    pub line: f64,
    pub signal: Option<f64>,
    pub histogram: Option<f64>,
}

/// MACD line, signal line and histogram from SMA-seeded EMAs.
#[must_use]
pub fn macd(prices: &[f64], fast: usize, slow: usize, signal_period: usize) -> Option<Macd> {
    if fast >= slow || prices.len() < slow + signal_period {
        return None;
    }
    let fast_series = ema_sma_seeded_series(prices, fast);
    let slow_series = ema_sma_seeded_series(prices, slow);
    // fast_series starts at index fast-1, slow_series at slow-1
    let offset = slow - fast;
    let history: Vec<f64> = slow_series
        .iter()
        .enumerate()
        .map(|(i, s)| fast_series[i + offset] - s)
        .collect();
    let line = *history.last()?;
    let signal = ema_sma_seeded(&history, signal_period);
    Some(Macd {
        line,
        signal,
        histogram: signal.map(|s| line - s),
    })
}

/// Percent change over `period` bars: `(p[-1] / p[-period-1] - 1) × 100`.
#[must_use]
pub fn rate_of_change(prices: &[f64], period: usize) -> f64 {
    if prices.len() <= period {
        return 0.0;
    }
    let base = prices[prices.len() - period - 1];
    if base == 0.0 {
        return 0.0;
    }
    (prices[prices.len() - 1] / base - 1.0) * 100.0
}

/// True range of every bar after the first.
#[must_use]
pub fn true_ranges(highs: &[f64], lows: &[f64], closes: &[f64]) -> Vec<f64> {
    let n = closes.len().min(highs.len()).min(lows.len());
    (1..n)
        .map(|i| {
            let high_low = highs[i] - lows[i];
            let high_close = (highs[i] - closes[i - 1]).abs();
            let low_close = (lows[i] - closes[i - 1]).abs();
            high_low.max(high_close).max(low_close)
        })
        .collect()
}

/// Mean true range over the last `period` bars, or `None` without `period + 1`
/// bars of history.
#[must_use]
pub fn atr_checked(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period + 1 {
        return None;
    }
    let trs = true_ranges(highs, lows, closes);
    if trs.len() < period {
        return None;
    }
    Some(mean(&trs[trs.len() - period..]))
}

/// ATR that never fails: short history falls back to 0.1% of the last close.
#[must_use]
pub fn atr(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> f64 {
    atr_checked(highs, lows, closes, period)
        .unwrap_or_else(|| closes.last().copied().unwrap_or(0.0) * ATR_FALLBACK_FRACTION)
}

/// Mean high-low range of the last `period` bars, current bar included.
#[must_use]
pub fn average_range(highs: &[f64], lows: &[f64], period: usize) -> Option<f64> {
    let n = highs.len().min(lows.len());
    if period == 0 || n < period {
        return None;
    }
    let ranges: Vec<f64> = (n - period..n).map(|i| highs[i] - lows[i]).collect();
    Some(mean(&ranges))
}

/// Least-squares slope of `values` against their index.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn linear_regression_slope(values: &[f64]) -> Option<f64> {
    let n = values.len();
    if n < 2 {
        return None;
    }
    let x_mean = (n - 1) as f64 / 2.0;
    let y_mean = mean(values);
    let (num, den) = values
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(num, den), (i, y)| {
            let dx = i as f64 - x_mean;
            (num + dx * (y - y_mean), den + dx * dx)
        });
    if den == 0.0 {
        None
    } else {
        Some(num / den)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SwingPoint {
    pub index: usize,
    pub price: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Swings {
    pub highs: Vec<SwingPoint>,
    pub lows: Vec<SwingPoint>,
}

/// Strict local extrema: a swing high is above every high within `radius` bars on
/// both sides, a swing low below every low. The first and last `radius` bars can
/// never qualify.
#[must_use]
pub fn swing_points(highs: &[f64], lows: &[f64], radius: usize) -> Swings {
    let n = highs.len().min(lows.len());
    let mut swings = Swings::default();
    if radius == 0 || n < 2 * radius + 1 {
        return swings;
    }
    for i in radius..n - radius {
        let neighbours = (i - radius..=i + radius).filter(|&j| j != i);
        if neighbours.clone().all(|j| highs[i] > highs[j]) {
            swings.highs.push(SwingPoint {
                index: i,
                price: highs[i],
            });
        }
        if neighbours.into_iter().all(|j| lows[i] < lows[j]) {
            swings.lows.push(SwingPoint {
                index: i,
                price: lows[i],
            });
        }
    }
    swings
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_sma() {
        assert_eq!(sma(&[1.0, 2.0, 3.0, 4.0], 2), Some(3.5));
        assert_eq!(sma(&[1.0], 2), None);
    }

    #[test]
    fn test_ema_first_price_seed() {
        // alpha = 0.5 for period 3
        let value = ema(&[1.0, 2.0, 3.0], 3);
        // 1 -> 1.5 -> 2.25
        assert!(approx(value, 2.25));
        // short history returns the last price
        assert!(approx(ema(&[4.0, 5.0], 3), 5.0));
        assert!(approx(ema(&[], 3), 0.0));
    }

    #[test]
    fn test_ema_sma_seed() {
        // seed = mean(1,2,3) = 2, then 4*0.5 + 2*0.5 = 3
        assert_eq!(ema_sma_seeded(&[1.0, 2.0, 3.0, 4.0], 3), Some(3.0));
        assert_eq!(ema_sma_seeded(&[1.0], 3), None);
    }

    #[test]
    fn test_rsi_conventions() {
        let rising: Vec<f64> = (0..20).map(f64::from).collect();
        assert!(approx(rsi(&rising, 14), 100.0));
        assert!(approx(rsi(&rising[..5], 14), 50.0));

        let falling: Vec<f64> = (0..20).rev().map(f64::from).collect();
        assert!(approx(rsi(&falling, 14), 0.0));

        // equal gains and losses
        let zigzag: Vec<f64> = (0..21).map(|i| if i % 2 == 0 { 1.0 } else { 2.0 }).collect();
        assert!(approx(rsi(&zigzag, 14), 50.0));
        assert!(approx(rsi_wilder(&zigzag, 14).unwrap(), 50.0));
        assert_eq!(rsi_wilder(&zigzag[..3], 14), None);
    }

    #[test]
    fn test_bollinger_population_std() {
        let prices = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        // mean 5, population std 2
        let bands = bollinger(&prices, 8, 2.0).unwrap();
        assert!(approx(bands.middle, 5.0));
        assert!(approx(bands.upper, 9.0));
        assert!(approx(bands.lower, 1.0));
        assert!(bollinger(&prices, 9, 2.0).is_none());
    }

    #[test]
    fn test_macd_on_linear_series() {
        let prices: Vec<f64> = (0..60).map(f64::from).collect();
        let m = macd(&prices, 12, 26, 9).unwrap();
        // on a straight line both EMAs lag by (period-1)/2, so MACD = 7 exactly
        assert!(approx(m.line, 7.0));
        assert!(approx(m.signal.unwrap(), 7.0));
        assert!(approx(m.histogram.unwrap(), 0.0));
        assert!(macd(&prices[..30], 12, 26, 9).is_none());
    }

    #[test]
    fn test_rate_of_change() {
        let prices = [100.0, 101.0, 102.0, 110.0];
        assert!(approx(rate_of_change(&prices, 3), 10.0));
        assert!(approx(rate_of_change(&prices, 4), 0.0));
    }

    #[test]
    fn test_atr_and_fallback() {
        let highs = [1.2, 1.3, 1.25];
        let lows = [1.0, 1.1, 1.15];
        let closes = [1.1, 1.2, 1.2];
        // TRs: max(0.2, 0.2, 0.0) = 0.2 ; max(0.1, 0.05, 0.05) = 0.1
        assert!(approx(atr(&highs, &lows, &closes, 2), 0.15));
        assert_eq!(atr_checked(&highs, &lows, &closes, 14), None);
        assert!(approx(atr(&highs, &lows, &closes, 14), 1.2 * ATR_FALLBACK_FRACTION));
    }

    #[test]
    fn test_average_range_includes_current_bar() {
        let highs = [2.0, 3.0, 5.0];
        let lows = [1.0, 1.0, 1.0];
        assert_eq!(average_range(&highs, &lows, 2), Some(3.0));
        assert_eq!(average_range(&highs, &lows, 4), None);
    }

    #[test]
    fn test_linear_regression_slope() {
        let values: Vec<f64> = (0..10).map(|i| 3.0 + 0.5 * f64::from(i)).collect();
        assert!(approx(linear_regression_slope(&values).unwrap(), 0.5));
        assert_eq!(linear_regression_slope(&[1.0]), None);
    }

    #[test]
    fn test_swing_points_use_radius() {
        let highs = [1.0, 2.0, 3.0, 2.0, 1.0, 2.5, 1.0];
        let lows = [1.0, 0.9, 0.8, 0.9, 0.5, 0.9, 1.0];
        let swings = swing_points(&highs, &lows, 2);
        assert_eq!(swings.highs, vec![SwingPoint { index: 2, price: 3.0 }]);
        assert_eq!(swings.lows, vec![SwingPoint { index: 4, price: 0.5 }]);

        // index 5 is a 1-bar swing high but not a 2-bar one
        let narrow = swing_points(&highs, &lows, 1);
        assert!(narrow.highs.iter().any(|p| p.index == 5));
        assert!(!swings.highs.iter().any(|p| p.index == 5));
    }
}
