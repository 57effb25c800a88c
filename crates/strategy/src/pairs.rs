use autotrader_core::instrument::round_to;
use autotrader_core::{Direction, EngineError, OutcomeStatus};
use serde::{Deserialize, Serialize};

const MIN_CANDLES: usize = 30;
const WINDOW: usize = 20;
const MIN_CORRELATION: f64 = 0.7;
const ENTRY_ZSCORE: f64 = 2.0;
const STD_FLOOR: f64 = 0.0001;

/// Relative-value trade on two correlated instruments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairsTrade {
    /// Direction on the first instrument; the second is traded the opposite way
    pub first: Direction,
    pub second: Direction,
    pub action: String,
    pub confidence: f64,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairsOutcome {
    pub first: String,
    pub second: String,
    pub zscore: f64,
    pub mean_ratio: f64,
    pub correlation: f64,
    /// Last ten price ratios, oldest first
    pub recent_ratios: Vec<f64>,
    pub trade: Option<PairsTrade>,
    pub status: OutcomeStatus,
    pub explanation: String,
}

#[allow(clippy::cast_precision_loss)]
fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Z-score of the latest price ratio within the trailing window.
fn ratio_zscore(ratios: &[f64]) -> (f64, f64) {
    let window = &ratios[ratios.len() - WINDOW..];
    let mean_ratio = mean(window);
    let variance = mean(
        &window
            .iter()
            .map(|r| (r - mean_ratio).powi(2))
            .collect::<Vec<_>>(),
    );
    let std = if variance > 0.0 {
        variance.sqrt()
    } else {
        STD_FLOOR
    };
    ((ratios[ratios.len() - 1] - mean_ratio) / std, mean_ratio)
}

/// Pearson correlation of the trailing window; 0 when either side is constant.
fn correlation(a: &[f64], b: &[f64]) -> f64 {
    let (a, b) = (&a[a.len() - WINDOW..], &b[b.len() - WINDOW..]);
    let (mean_a, mean_b) = (mean(a), mean(b));
    let (mut num, mut var_a, mut var_b) = (0.0, 0.0, 0.0);
    for (x, y) in a.iter().zip(b) {
        num += (x - mean_a) * (y - mean_b);
        var_a += (x - mean_a).powi(2);
        var_b += (y - mean_b).powi(2);
    }
    let denom = var_a.sqrt() * var_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        num / denom
    }
}

/// Statistical arbitrage between two close series aligned bar by bar.
///
/// Trades only when the two are correlated beyond ±0.7 and the current ratio sits
/// more than two standard deviations from its 20-bar mean: the rich leg is sold
/// and the cheap leg bought.
///
/// # Errors
/// [`EngineError::InsufficientData`] if either series has fewer than 30 closes.
pub fn analyze_pair(
    first_closes: &[f64],
    second_closes: &[f64],
    first: &str,
    second: &str,
) -> Result<PairsOutcome, EngineError> {
    let shortest = first_closes.len().min(second_closes.len());
    if shortest < MIN_CANDLES {
        return Err(EngineError::InsufficientData {
            required: MIN_CANDLES,
            actual: shortest,
        });
    }
    let (a, b) = (&first_closes[..shortest], &second_closes[..shortest]);

    let ratios: Vec<f64> = a
        .iter()
        .zip(b)
        .map(|(x, y)| if *y == 0.0 { 0.0 } else { x / y })
        .collect();
    let (zscore, mean_ratio) = ratio_zscore(&ratios);
    let zscore = round_to(zscore, 2);
    let correlation = round_to(correlation(a, b), 3);

    let mut outcome = PairsOutcome {
        first: first.to_string(),
        second: second.to_string(),
        zscore,
        mean_ratio: round_to(mean_ratio, 5),
        correlation,
        recent_ratios: ratios[ratios.len() - 10..].to_vec(),
        trade: None,
        status: OutcomeStatus::NoSignal,
        explanation: "Pairs trading profits from mean reversion of correlated spreads"
            .to_string(),
    };

    if correlation.abs() < MIN_CORRELATION {
        outcome.explanation =
            format!("Correlation {correlation} too low for pairs trading (need {MIN_CORRELATION})");
        return Ok(outcome);
    }

    let confidence = (60.0 + zscore.abs() * 10.0).min(90.0);
    let trade = if zscore > ENTRY_ZSCORE {
        Some(PairsTrade {
            first: Direction::Sell,
            second: Direction::Buy,
            action: format!("SELL {first}, BUY {second}"),
            confidence,
            reason: format!("Z-score={zscore}: {first} overvalued vs {second}"),
        })
    } else if zscore < -ENTRY_ZSCORE {
        Some(PairsTrade {
            first: Direction::Buy,
            second: Direction::Sell,
            action: format!("BUY {first}, SELL {second}"),
            confidence,
            reason: format!("Z-score={zscore}: {first} undervalued vs {second}"),
        })
    } else {
        None
    };

    if trade.is_some() {
        outcome.status = OutcomeStatus::Signal;
    }
    outcome.trade = trade;
    Ok(outcome)
}
