use anyhow::Result;
use serde::{Deserialize, Serialize};

/// One OHLC bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Candle {
    #[must_use]
    pub const fn new(open: f64, high: f64, low: f64, close: f64) -> Self {
        Self {
            open,
            high,
            low,
            close,
        }
    }

    /// High-low range of the bar.
    #[must_use]
    pub fn range(&self) -> f64 {
        self.high - self.low
    }
}

/// Immutable OHLC series, oldest bar first.
///
/// Columns are kept as parallel vectors because every indicator consumes a single
/// column at a time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandleSeries {
    opens: Vec<f64>,
    highs: Vec<f64>,
    lows: Vec<f64>,
    closes: Vec<f64>,
}

impl CandleSeries {
    /// Builds a series from parallel columns.
    ///
    /// # Errors
    /// Returns an error if the columns differ in length.
    pub fn from_columns(
        opens: Vec<f64>,
        highs: Vec<f64>,
        lows: Vec<f64>,
        closes: Vec<f64>,
    ) -> Result<Self> {
        let n = closes.len();
        if opens.len() != n || highs.len() != n || lows.len() != n {
            anyhow::bail!(
                "OHLC columns must be the same length (open={}, high={}, low={}, close={})",
                opens.len(),
                highs.len(),
                lows.len(),
                n
            );
        }
        Ok(Self {
            opens,
            highs,
            lows,
            closes,
        })
    }

    #[must_use]
    pub fn from_candles(candles: &[Candle]) -> Self {
        Self {
            opens: candles.iter().map(|c| c.open).collect(),
            highs: candles.iter().map(|c| c.high).collect(),
            lows: candles.iter().map(|c| c.low).collect(),
            closes: candles.iter().map(|c| c.close).collect(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.closes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.closes.is_empty()
    }

    #[must_use]
    pub fn opens(&self) -> &[f64] {
        &self.opens
    }

    #[must_use]
    pub fn highs(&self) -> &[f64] {
        &self.highs
    }

    #[must_use]
    pub fn lows(&self) -> &[f64] {
        &self.lows
    }

    #[must_use]
    pub fn closes(&self) -> &[f64] {
        &self.closes
    }

    #[must_use]
    pub fn last_close(&self) -> Option<f64> {
        self.closes.last().copied()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<Candle> {
        Some(Candle::new(
            *self.opens.get(index)?,
            *self.highs.get(index)?,
            *self.lows.get(index)?,
            *self.closes.get(index)?,
        ))
    }

    /// The first `end` bars. Used by walk-forward evaluation so that analysis at
    /// step `end` never sees later bars.
    #[must_use]
    pub fn prefix(&self, end: usize) -> Self {
        let end = end.min(self.len());
        Self {
            opens: self.opens[..end].to_vec(),
            highs: self.highs[..end].to_vec(),
            lows: self.lows[..end].to_vec(),
            closes: self.closes[..end].to_vec(),
        }
    }
}
