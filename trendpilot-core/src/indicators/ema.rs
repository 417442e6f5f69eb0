//! Exponential Moving Average.
//!
//! Recursive: EMA[t] = round2(k * price[t] + (1 - k) * EMA[t-1]), k = 2 / (period + 1)
//! Seed: EMA[period-1] = round2(SMA of the first `period` values).
//! Lookback: period - 1.

use super::{round2, Indicator, IndicatorSeries};
use crate::domain::{Candle, PriceSource};

/// EMA over an arbitrary price series, rounded to two decimals at each step.
pub fn exponential_moving_average(series: &[f64], period: usize) -> IndicatorSeries {
    let n = series.len();
    let mut result = vec![None; n];

    if period == 0 || n < period {
        return result;
    }

    let k = 2.0 / (period as f64 + 1.0);

    let seed_window = &series[..period];
    if seed_window.iter().any(|v| v.is_nan()) {
        return result;
    }
    let seed = round2(seed_window.iter().sum::<f64>() / period as f64);
    result[period - 1] = Some(seed);

    let mut prev = seed;
    for i in period..n {
        let price = series[i];
        if price.is_nan() {
            // Once the recurrence sees NaN every later value is tainted.
            return result;
        }
        let ema = round2(price * k + prev * (1.0 - k));
        result[i] = Some(ema);
        prev = ema;
    }

    result
}

#[derive(Debug, Clone)]
pub struct Ema {
    period: usize,
    source: PriceSource,
    name: String,
}

impl Ema {
    pub fn new(period: usize, source: PriceSource) -> Self {
        assert!(period >= 1, "EMA period must be >= 1");
        Self {
            period,
            source,
            name: format!("ema_{period}"),
        }
    }
}

impl Indicator for Ema {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period.saturating_sub(1)
    }

    fn compute(&self, candles: &[Candle]) -> IndicatorSeries {
        let prices: Vec<f64> = candles.iter().map(|c| self.source.pick(c)).collect();
        exponential_moving_average(&prices, self.period)
    }
}
