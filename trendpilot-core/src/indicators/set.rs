//! Precomputed indicator series for one evaluation window.
//!
//! All series are computed once per cycle (or once per backtest) so the
//! evaluator only does index lookups.

use super::{
    directional_strength_index, exponential_moving_average, moving_average,
    trailing_average_volume, IndicatorSeries,
};
use crate::domain::Candle;
use crate::strategy::StrategySettings;

/// Every series the strategy reads, aligned with the candle window.
#[derive(Debug, Clone, Default)]
pub struct IndicatorSet {
    pub ema: IndicatorSeries,
    pub ma: IndicatorSeries,
    pub trend_fast: IndicatorSeries,
    pub trend_slow: IndicatorSeries,
    pub adx: IndicatorSeries,
    pub avg_volume: IndicatorSeries,
}

/// Indicator values at a single index; `None` means not yet defined.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct IndicatorSnapshot {
    pub ema: Option<f64>,
    pub ma: Option<f64>,
    pub trend_fast: Option<f64>,
    pub trend_slow: Option<f64>,
    pub adx: Option<f64>,
    pub avg_volume: Option<f64>,
}

impl IndicatorSet {
    pub fn compute(candles: &[Candle], settings: &StrategySettings) -> Self {
        let prices: Vec<f64> = candles
            .iter()
            .map(|c| settings.price_source.pick(c))
            .collect();
        let high: Vec<f64> = candles.iter().map(|c| c.high).collect();
        let low: Vec<f64> = candles.iter().map(|c| c.low).collect();
        let close: Vec<f64> = candles.iter().map(|c| c.close).collect();

        let avg_volume = (0..candles.len())
            .map(|i| trailing_average_volume(candles, i, settings.volume_lookback))
            .collect();

        Self {
            ema: exponential_moving_average(&prices, settings.ema_period),
            ma: moving_average(&prices, settings.ma_period),
            trend_fast: moving_average(&prices, settings.trend_fast_period),
            trend_slow: moving_average(&prices, settings.trend_slow_period),
            adx: directional_strength_index(&high, &low, &close, settings.adx_period),
            avg_volume,
        }
    }

    pub fn len(&self) -> usize {
        self.ma.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ma.is_empty()
    }

    /// Values at `index`; out-of-range indices read as all-undefined.
    pub fn snapshot(&self, index: usize) -> IndicatorSnapshot {
        let at = |s: &IndicatorSeries| s.get(index).copied().flatten();
        IndicatorSnapshot {
            ema: at(&self.ema),
            ma: at(&self.ma),
            trend_fast: at(&self.trend_fast),
            trend_slow: at(&self.trend_slow),
            adx: at(&self.adx),
            avg_volume: at(&self.avg_volume),
        }
    }
}
