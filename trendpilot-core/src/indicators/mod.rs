//! Indicator engine: moving average, exponential moving average and the
//! directional-strength index (ADX).
//!
//! Every indicator is a pure function from an ordered input series to an
//! aligned output series of the same length. Warm-up positions are `None`.
//! MA and EMA values are rounded to two decimals at every step; the
//! rounding is part of the contract because strategy decisions compare the
//! rounded values directly.

pub mod adx;
pub mod ema;
pub mod set;
pub mod sma;
pub mod volume;

pub use adx::{directional_strength_index, true_range, wilder_smooth, Adx};
pub use ema::{exponential_moving_average, Ema};
pub use set::{IndicatorSet, IndicatorSnapshot};
pub use sma::{moving_average, Sma};
pub use volume::trailing_average_volume;

use crate::domain::Candle;

/// Aligned indicator output; `None` marks warm-up or undefined positions.
pub type IndicatorSeries = Vec<Option<f64>>;

/// Trait for candle-driven indicators.
///
/// # Look-ahead guard
/// The value at index t may only depend on candles `0..=t`.
pub trait Indicator: Send + Sync {
    /// Human-readable name (e.g., "ma_50", "adx_14").
    fn name(&self) -> &str;

    /// Number of candles needed before the indicator produces a value.
    fn lookback(&self) -> usize;

    /// Compute the indicator for the entire candle series.
    fn compute(&self, candles: &[Candle]) -> IndicatorSeries;
}

/// Round to two decimals the way Python's `round(x, 2)` does: the exact
/// binary value is rounded, ties go to even.
///
/// `value * 100.0` would round once more before the tie check (2.675 is
/// stored as 2.67499.. and would come out 2.68), so this goes through the
/// correctly rounded decimal formatter instead.
pub fn round2(value: f64) -> f64 {
    format!("{value:.2}").parse().unwrap_or(value)
}

/// Create synthetic 15-minute candles from prices for testing.
///
/// open = prev price (or price for the first candle), close = price,
/// high/low = max/min(open, close) ± 1.0, volume = 1000.
#[cfg(test)]
pub fn make_candles(prices: &[f64]) -> Vec<Candle> {
    use chrono::{Duration, TimeZone, Utc};
    let base = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
    prices
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { prices[i - 1] };
            let open_time = base + Duration::minutes(15 * i as i64);
            Candle {
                open_time,
                open,
                high: open.max(close) + 1.0,
                low: open.min(close) - 1.0,
                close,
                volume: 1000.0,
                close_time: open_time + Duration::minutes(15) - Duration::milliseconds(1),
            }
        })
        .collect()
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round2_basic() {
        assert_eq!(round2(1.234), 1.23);
        assert_eq!(round2(1.236), 1.24);
        assert_eq!(round2(-1.236), -1.24);
        assert_eq!(round2(42.0), 42.0);
    }

    #[test]
    fn round2_uses_the_exact_binary_value() {
        // 2.675 is 2.67499999.. in binary.
        assert_eq!(round2(2.675), 2.67);
        assert_eq!(round2(1.005), 1.0);
    }

    #[test]
    fn round2_exact_ties_go_to_even() {
        assert_eq!(round2(0.125), 0.12);
        assert_eq!(round2(-0.125), -0.12);
        assert_eq!(round2(0.375), 0.38);
        assert_eq!(round2(43210.125), 43210.12);
    }

    #[test]
    fn moving_average_of_a_tie_rounds_to_even() {
        // mean(20.0, 0.25) = 10.125 exactly.
        assert_eq!(moving_average(&[20.0, 0.25], 2), vec![None, Some(10.12)]);
    }

    #[test]
    fn round2_passes_non_finite_through() {
        assert!(round2(f64::NAN).is_nan());
        assert_eq!(round2(f64::INFINITY), f64::INFINITY);
    }
}
