use crate::instrument::{round_to, stop_pip_cap, uses_wide_stops, InstrumentSpec};
use crate::signal::Direction;

/// Smallest tradable size.
pub const MIN_LOTS: f64 = 0.01;
/// Largest size the engine will ever propose.
pub const MAX_LOTS: f64 = 10.0;

/// Risk-percent lot sizing from stop distance and instrument pip economics.
///
/// `lots = risk_amount / (stop_pips × pip_value)` where
/// `risk_amount = balance × risk_percent / 100`. The stop distance is capped per
/// instrument class (see [`stop_pip_cap`]) so a pathological stop cannot shrink
/// the size to nothing, and the result is rounded to 2 dp then clamped to
/// `[MIN_LOTS, MAX_LOTS]`.
///
/// # Arguments
/// * `balance` - Account balance in account currency
/// * `risk_percent` - Percent of balance to risk (1.0 = 1%)
/// * `entry` - Entry price
/// * `stop_loss` - Stop price
/// * `symbol` - Instrument, used for the pip lookup
///
/// # Returns
/// Lot size; [`MIN_LOTS`] when entry and stop coincide or inputs are not finite.
#[must_use]
pub fn calculate_lot_size(
    balance: f64,
    risk_percent: f64,
    entry: f64,
    stop_loss: f64,
    symbol: &str,
) -> f64 {
    if !entry.is_finite() || !stop_loss.is_finite() || entry == 0.0 || entry == stop_loss {
        return MIN_LOTS;
    }

    let spec = InstrumentSpec::for_symbol(symbol);
    let stop_pips = spec.to_pips(entry - stop_loss).min(stop_pip_cap(symbol));
    if stop_pips <= 0.0 {
        return MIN_LOTS;
    }

    let risk_amount = balance * (risk_percent / 100.0);
    let lots = round_to(risk_amount / (stop_pips * spec.pip_value), 2);
    if lots.is_nan() {
        return MIN_LOTS;
    }
    lots.clamp(MIN_LOTS, MAX_LOTS)
}

/// Reward-to-risk ratio rounded to 2 dp; 0 when the stop is on the wrong side.
#[must_use]
pub fn risk_reward(direction: Direction, entry: f64, stop_loss: f64, take_profit: f64) -> f64 {
    let (risk, reward) = match direction {
        Direction::Buy => (entry - stop_loss, take_profit - entry),
        Direction::Sell => (stop_loss - entry, entry - take_profit),
        Direction::Wait => return 0.0,
    };
    if risk > 0.0 {
        round_to(reward / risk, 2)
    } else {
        0.0
    }
}

/// Fallback stop/target when no ATR is available, in pips.
const FALLBACK_STOP_PIPS: f64 = 30.0;
const FALLBACK_TARGET_PIPS: f64 = 60.0;

/// ATR-based stop and target levels bounded to realistic pip ranges.
///
/// The stop sits 1.5 × ATR from entry, bounded to 10..=100 pips (50..=500 for
/// gold and bitcoin). The target is the stop distance times `risk_reward`. With
/// no ATR the levels fall back to a 30 pip stop and a 60 pip target. Both levels
/// are rounded to the instrument's precision.
///
/// Returns `(stop_loss, take_profit)`.
#[must_use]
pub fn calculate_sl_tp_levels(
    entry: f64,
    direction: Direction,
    atr: Option<f64>,
    symbol: &str,
    risk_reward: f64,
) -> (f64, f64) {
    let spec = InstrumentSpec::for_symbol(symbol);
    let sign = if direction == Direction::Sell { -1.0 } else { 1.0 };

    let (stop_distance, target_distance) = match atr.filter(|a| *a > 0.0 && a.is_finite()) {
        None => (
            FALLBACK_STOP_PIPS * spec.pip_size,
            FALLBACK_TARGET_PIPS * spec.pip_size,
        ),
        Some(atr) => {
            let (min_pips, max_pips) = if uses_wide_stops(symbol) {
                (50.0, 500.0)
            } else {
                (10.0, 100.0)
            };
            let stop = (atr * 1.5)
                .min(max_pips * spec.pip_size)
                .max(min_pips * spec.pip_size);
            (stop, stop * risk_reward)
        }
    };

    (
        spec.round_price(entry - sign * stop_distance),
        spec.round_price(entry + sign * target_distance),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_standard_pair_sizing() {
        // $100 risk over a 50 pip stop at $10/pip
        let lots = calculate_lot_size(10_000.0, 1.0, 1.1000, 1.0950, "EUR/USD");
        assert!((lots - 0.20).abs() < 1e-9);
    }

    #[test]
    fn test_jpy_and_gold_sizing() {
        // 50 pips at 0.01 pip size, $10/pip
        let lots = calculate_lot_size(10_000.0, 1.0, 150.00, 149.50, "USD/JPY");
        assert!((lots - 0.20).abs() < 1e-9);

        // $10 move on gold = 1000 pips, capped to 500, $1/pip -> 100/500
        let lots = calculate_lot_size(10_000.0, 1.0, 2000.0, 1990.0, "XAU/USD");
        assert!((lots - 0.20).abs() < 1e-9);
    }

    #[test]
    fn test_degenerate_inputs() {
        assert!((calculate_lot_size(10_000.0, 1.0, 1.1, 1.1, "EUR/USD") - MIN_LOTS).abs() < 1e-12);
        assert!((calculate_lot_size(10_000.0, 1.0, 0.0, 1.1, "EUR/USD") - MIN_LOTS).abs() < 1e-12);
        assert!(
            (calculate_lot_size(10_000.0, 1.0, f64::NAN, 1.1, "EUR/USD") - MIN_LOTS).abs() < 1e-12
        );
    }

    #[test]
    fn test_clamps() {
        // 1 pip stop on a huge balance clamps at the ceiling
        let lots = calculate_lot_size(1_000_000.0, 5.0, 1.1000, 1.0999, "EUR/USD");
        assert!((lots - MAX_LOTS).abs() < 1e-12);
        // tiny balance clamps at the floor
        let lots = calculate_lot_size(10.0, 1.0, 1.1000, 1.0900, "EUR/USD");
        assert!((lots - MIN_LOTS).abs() < 1e-12);
    }

    #[test]
    fn test_risk_reward() {
        assert!((risk_reward(Direction::Buy, 1.0, 0.99, 1.02) - 2.0).abs() < 1e-9);
        assert!((risk_reward(Direction::Sell, 1.0, 1.01, 0.985) - 1.5).abs() < 1e-9);
        assert!(risk_reward(Direction::Buy, 1.0, 1.01, 1.02).abs() < f64::EPSILON);
        assert!(risk_reward(Direction::Wait, 1.0, 0.99, 1.02).abs() < f64::EPSILON);
    }

    #[test]
    fn test_sl_tp_fallback_without_atr() {
        let (sl, tp) = calculate_sl_tp_levels(1.1000, Direction::Buy, None, "EUR/USD", 2.0);
        assert!((sl - 1.0970).abs() < 1e-9);
        assert!((tp - 1.1060).abs() < 1e-9);

        let (sl, tp) = calculate_sl_tp_levels(1.1000, Direction::Sell, None, "EUR/USD", 2.0);
        assert!((sl - 1.1030).abs() < 1e-9);
        assert!((tp - 1.0940).abs() < 1e-9);
    }

    #[test]
    fn test_sl_tp_bounds() {
        // 1.5 × 0.0200 = 200 pips, capped to 100
        let (sl, tp) = calculate_sl_tp_levels(1.1000, Direction::Buy, Some(0.0200), "EUR/USD", 2.0);
        assert!((sl - 1.0900).abs() < 1e-9);
        assert!((tp - 1.1200).abs() < 1e-9);

        // 1.5 × 0.0002 = 3 pips, floored to 10
        let (sl, _) = calculate_sl_tp_levels(1.1000, Direction::Buy, Some(0.0002), "EUR/USD", 2.0);
        assert!((sl - 1.0990).abs() < 1e-9);

        // gold floor is 50 pips = $0.50
        let (sl, tp) = calculate_sl_tp_levels(2000.0, Direction::Sell, Some(0.1), "XAU/USD", 2.0);
        assert!((sl - 2000.5).abs() < 1e-9);
        assert!((tp - 1999.0).abs() < 1e-9);
    }

    proptest! {
        #[test]
        fn lots_always_within_bounds(
            balance in 0.0..10_000_000.0_f64,
            risk in 0.0..100.0_f64,
            entry in 0.5..2.0_f64,
            offset in -0.5..0.5_f64,
        ) {
            let lots = calculate_lot_size(balance, risk, entry, entry + offset, "EUR/USD");
            prop_assert!((MIN_LOTS..=MAX_LOTS).contains(&lots));
        }
    }
}
