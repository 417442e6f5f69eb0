//! Simple Moving Average.
//!
//! Arithmetic mean of the last `period` values, rounded to two decimals.
//! Lookback: period - 1 (first value at index period-1).

use super::{round2, Indicator, IndicatorSeries};
use crate::domain::{Candle, PriceSource};

/// Sliding mean over the last `period` values.
///
/// Each window is summed afresh rather than rolled, so the output does not
/// accumulate floating-point drift over long series. A NaN anywhere in the
/// window yields `None`.
pub fn moving_average(series: &[f64], period: usize) -> IndicatorSeries {
    let n = series.len();
    let mut result = vec![None; n];

    if period == 0 || n < period {
        return result;
    }

    for i in (period - 1)..n {
        let window = &series[(i + 1 - period)..=i];
        if window.iter().any(|v| v.is_nan()) {
            continue;
        }
        let sum: f64 = window.iter().sum();
        result[i] = Some(round2(sum / period as f64));
    }

    result
}

#[derive(Debug, Clone)]
pub struct Sma {
    period: usize,
    source: PriceSource,
    name: String,
}

impl Sma {
    pub fn new(period: usize, source: PriceSource) -> Self {
        assert!(period >= 1, "MA period must be >= 1");
        Self {
            period,
            source,
            name: format!("ma_{period}"),
        }
    }
}

impl Indicator for Sma {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period.saturating_sub(1)
    }

    fn compute(&self, candles: &[Candle]) -> IndicatorSeries {
        let prices: Vec<f64> = candles.iter().map(|c| self.source.pick(c)).collect();
        moving_average(&prices, self.period)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_candles, DEFAULT_EPSILON};

    #[test]
    fn ma_5_basic() {
        let result = moving_average(&[10.0, 11.0, 12.0, 13.0, 14.0, 15.0, 16.0], 5);

        assert_eq!(result.len(), 7);
        for (i, v) in result.iter().enumerate().take(4) {
            assert!(v.is_none(), "expected None at index {i}");
        }
        assert_approx(result[4].unwrap(), 12.0, DEFAULT_EPSILON);
        assert_approx(result[5].unwrap(), 13.0, DEFAULT_EPSILON);
        assert_approx(result[6].unwrap(), 14.0, DEFAULT_EPSILON);
    }

    #[test]
    fn ma_rounds_to_cents() {
        // mean(1, 2, 2) = 1.6666.. -> 1.67
        let result = moving_average(&[1.0, 2.0, 2.0], 3);
        assert_eq!(result[2], Some(1.67));
    }

    #[test]
    fn ma_1_is_price() {
        let result = moving_average(&[100.0, 200.0, 300.0], 1);
        assert_eq!(result, vec![Some(100.0), Some(200.0), Some(300.0)]);
    }

    #[test]
    fn ma_nan_window_is_undefined() {
        let result = moving_average(&[10.0, 11.0, f64::NAN, 13.0, 14.0, 15.0], 3);
        assert!(result[2].is_none());
        assert!(result[3].is_none());
        assert!(result[4].is_none());
        assert_eq!(result[5], Some(14.0));
    }

    #[test]
    fn ma_too_few_values() {
        let result = moving_average(&[10.0, 11.0], 5);
        assert!(result.iter().all(|v| v.is_none()));
    }

    #[test]
    fn ma_zero_period_is_all_undefined() {
        let result = moving_average(&[10.0, 11.0], 0);
        assert_eq!(result, vec![None, None]);
    }

    #[test]
    fn indicator_uses_price_source() {
        let candles = make_candles(&[10.0, 12.0, 14.0]);
        // opens: 10, 10, 12 ; closes: 10, 12, 14
        let on_open = Sma::new(3, PriceSource::Open).compute(&candles);
        let on_close = Sma::new(3, PriceSource::Close).compute(&candles);
        assert_eq!(on_open[2], Some(10.67));
        assert_eq!(on_close[2], Some(12.0));
        assert_eq!(Sma::new(50, PriceSource::Open).lookback(), 49);
        assert_eq!(Sma::new(50, PriceSource::Open).name(), "ma_50");
    }
}
