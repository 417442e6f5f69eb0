//! Trade-duration calendar.
//!
//! Durations are computed from the literal timestamp strings stored on each
//! trade, using a simplified calendar: every year has 365 days and months
//! have fixed lengths (February is always 28 days). Spans that cross a
//! February 29th therefore come out one day short. This is a known
//! approximation and is kept as-is so that durations match the historic
//! trade logs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Timestamp layout used for every trade time string.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

const MONTH_DAYS: [i64; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

#[derive(Debug, Error, PartialEq)]
pub enum DurationError {
    #[error("malformed timestamp '{0}' (expected YYYY-MM-DD HH:MM:SS[.ffffff])")]
    Malformed(String),

    #[error("close time '{close}' is before open time '{open}'")]
    Negative { open: String, close: String },
}

/// Whole days, hours and minutes between two trade timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TradeDuration {
    pub days: i64,
    pub hours: i64,
    pub minutes: i64,
}

impl TradeDuration {
    pub fn total_minutes(&self) -> i64 {
        self.days * 24 * 60 + self.hours * 60 + self.minutes
    }
}

impl std::fmt::Display for TradeDuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} days, {} hours, {} minutes",
            self.days, self.hours, self.minutes
        )
    }
}

/// Render a timestamp the way trade times are stored.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Render a millisecond epoch timestamp; `None` if out of range.
pub fn format_millis(ms: i64) -> Option<String> {
    DateTime::from_timestamp_millis(ms).map(format_timestamp)
}

/// Duration between two literal timestamps on the simplified calendar.
pub fn trade_duration(open_time: &str, close_time: &str) -> Result<TradeDuration, DurationError> {
    let open = to_seconds(open_time)?;
    let close = to_seconds(close_time)?;

    let mut diff = close - open;
    if diff < 0 {
        return Err(DurationError::Negative {
            open: open_time.to_string(),
            close: close_time.to_string(),
        });
    }

    let days = diff / 86_400;
    diff %= 86_400;
    let hours = diff / 3_600;
    diff %= 3_600;
    let minutes = diff / 60;

    Ok(TradeDuration {
        days,
        hours,
        minutes,
    })
}

fn to_seconds(raw: &str) -> Result<i64, DurationError> {
    let malformed = || DurationError::Malformed(raw.to_string());
    let t = raw.trim();

    let (date, time) = t.split_once(' ').ok_or_else(malformed)?;

    let mut date_parts = date.split('-');
    let y: i64 = parse_part(date_parts.next()).ok_or_else(malformed)?;
    let m: i64 = parse_part(date_parts.next()).ok_or_else(malformed)?;
    let d: i64 = parse_part(date_parts.next()).ok_or_else(malformed)?;
    // Four-digit years keep the day count far from i64 overflow.
    if date_parts.next().is_some()
        || !(0..=9999).contains(&y)
        || !(1..=12).contains(&m)
        || !(1..=31).contains(&d)
    {
        return Err(malformed());
    }

    let mut time_parts = time.trim().split(':');
    let h: i64 = parse_part(time_parts.next()).ok_or_else(malformed)?;
    let mi: i64 = parse_part(time_parts.next()).ok_or_else(malformed)?;
    // Fractional seconds are dropped.
    let s: f64 = time_parts
        .next()
        .and_then(|p| p.parse::<f64>().ok())
        .ok_or_else(malformed)?;
    if time_parts.next().is_some()
        || !(0..=23).contains(&h)
        || !(0..=59).contains(&mi)
        || !(0.0..61.0).contains(&s)
    {
        return Err(malformed());
    }

    let month_offset: i64 = MONTH_DAYS[..(m as usize - 1)].iter().sum();
    let days = y
        .checked_mul(365)
        .and_then(|v| v.checked_add(month_offset + (d - 1)))
        .ok_or_else(malformed)?;
    days.checked_mul(86_400)
        .and_then(|v| v.checked_add(h * 3_600 + mi * 60 + s.trunc() as i64))
        .ok_or_else(malformed)
}

fn parse_part(part: Option<&str>) -> Option<i64> {
    part?.parse().ok()
}
