//! Trailing volume average used by the conviction filter.

use crate::domain::Candle;

/// Mean volume of the `lookback` candles strictly before `index`.
///
/// `None` when fewer than `lookback` earlier candles exist or `lookback` is 0.
pub fn trailing_average_volume(candles: &[Candle], index: usize, lookback: usize) -> Option<f64> {
    if lookback == 0 || index < lookback || index > candles.len() {
        return None;
    }
    let window = &candles[index - lookback..index];
    let total: f64 = window.iter().map(|c| c.volume).sum();
    Some(total / lookback as f64)
}
