//! Candle: the fundamental market data unit.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use crate::calendar::format_timestamp;

/// OHLCV candle for one symbol over one interval.
///
/// Candles arrive in chronological order and are never mutated once fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub close_time: DateTime<Utc>,
}

impl Candle {
    /// Returns true if any OHLCV field is NaN.
    pub fn is_void(&self) -> bool {
        self.open.is_nan()
            || self.high.is_nan()
            || self.low.is_nan()
            || self.close.is_nan()
            || self.volume.is_nan()
    }

    /// Sanity check: time ordering plus high/low bracketing open and close.
    pub fn is_sane(&self) -> bool {
        if self.is_void() || self.close_time <= self.open_time {
            return false;
        }
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.open > 0.0
            && self.volume >= 0.0
    }

    /// Fractional move of the candle body relative to its open.
    pub fn fractional_move(&self) -> f64 {
        if self.open == 0.0 {
            return 0.0;
        }
        (self.close - self.open).abs() / self.open
    }

    /// Body size as a fraction of the high-low range (0 for a flat range).
    pub fn body_ratio(&self) -> f64 {
        let range = self.high - self.low;
        if range <= 0.0 {
            return 0.0;
        }
        (self.close - self.open).abs() / range
    }

    /// `(year, month)` of the candle's open time.
    pub fn month(&self) -> (i32, u32) {
        (self.open_time.year(), self.open_time.month())
    }

    /// Open time rendered as `YYYY-MM-DD HH:MM:SS.ffffff`.
    pub fn open_time_str(&self) -> String {
        format_timestamp(self.open_time)
    }
}

/// Which candle price feeds the trend indicators.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    #[default]
    Open,
    Close,
}

impl PriceSource {
    pub fn pick(self, candle: &Candle) -> f64 {
        match self {
            PriceSource::Open => candle.open,
            PriceSource::Close => candle.close,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_candle() -> Candle {
        Candle {
            open_time: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            open: 100.0,
            high: 105.0,
            low: 98.0,
            close: 104.0,
            volume: 1_500.0,
            close_time: Utc.with_ymd_and_hms(2024, 3, 1, 12, 14, 59).unwrap(),
        }
    }

    #[test]
    fn candle_is_sane() {
        assert!(sample_candle().is_sane());
    }

    #[test]
    fn close_time_must_follow_open_time() {
        let mut candle = sample_candle();
        candle.close_time = candle.open_time;
        assert!(!candle.is_sane());
    }

    #[test]
    fn detects_void() {
        let mut candle = sample_candle();
        candle.high = f64::NAN;
        assert!(candle.is_void());
        assert!(!candle.is_sane());
    }

    #[test]
    fn body_ratio_and_move() {
        let candle = sample_candle();
        // |104 - 100| / (105 - 98)
        assert!((candle.body_ratio() - 4.0 / 7.0).abs() < 1e-12);
        assert!((candle.fractional_move() - 0.04).abs() < 1e-12);
    }

    #[test]
    fn flat_range_has_zero_body_ratio() {
        let mut candle = sample_candle();
        candle.high = 100.0;
        candle.low = 100.0;
        candle.close = 100.0;
        assert_eq!(candle.body_ratio(), 0.0);
    }

    #[test]
    fn month_and_timestamp_string() {
        let candle = sample_candle();
        assert_eq!(candle.month(), (2024, 3));
        assert_eq!(candle.open_time_str(), "2024-03-01 12:00:00.000000");
    }

    #[test]
    fn price_source_picks_field() {
        let candle = sample_candle();
        assert_eq!(PriceSource::Open.pick(&candle), 100.0);
        assert_eq!(PriceSource::Close.pick(&candle), 104.0);
    }
}
