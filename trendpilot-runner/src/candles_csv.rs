//! Candle import from CSV for offline backtests.
//!
//! Expected header: `open_time,open,high,low,close,volume[,close_time]`.
//! Times are either epoch milliseconds or `YYYY-MM-DD HH:MM:SS[.ffffff]`
//! (UTC). A missing `close_time` is derived from the interval.

use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::Deserialize;
use tracing::warn;
use trendpilot_core::domain::Candle;

#[derive(Debug, Deserialize)]
struct CsvCandle {
    open_time: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
    #[serde(default)]
    close_time: Option<String>,
}

fn parse_time(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ms) = raw.parse::<i64>() {
        return DateTime::<Utc>::from_timestamp_millis(ms);
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Load candles, sorted by open time. Rows that fail the sanity check are
/// dropped with a warning; duplicated open times keep the first row.
pub fn load_candles_csv(path: &Path, interval: Duration) -> Result<Vec<Candle>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    let mut candles = Vec::new();
    for (i, row) in reader.deserialize::<CsvCandle>().enumerate() {
        let line = i + 2;
        let row = row.with_context(|| format!("{}: bad row at line {line}", path.display()))?;
        let Some(open_time) = parse_time(&row.open_time) else {
            bail!("{}: unparseable open_time '{}' at line {line}", path.display(), row.open_time);
        };
        let close_time = match row.close_time.as_deref().filter(|s| !s.is_empty()) {
            Some(raw) => match parse_time(raw) {
                Some(t) => t,
                None => bail!("{}: unparseable close_time '{raw}' at line {line}", path.display()),
            },
            None => open_time + interval - Duration::milliseconds(1),
        };

        let candle = Candle {
            open_time,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
            close_time,
        };
        if !candle.is_sane() {
            warn!(line, open_time = %open_time, "dropping insane candle");
            continue;
        }
        candles.push(candle);
    }

    candles.sort_by_key(|c| c.open_time);
    candles.dedup_by_key(|c| c.open_time);
    Ok(candles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn write(dir: &Path, body: &str) -> std::path::PathBuf {
        let path = dir.join("candles.csv");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn parses_both_time_formats() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "open_time,open,high,low,close,volume\n\
             2024-01-01 00:15:00,101,102,100,101.5,12\n\
             1704067200000,100,101,99,100.5,10\n",
        );
        let candles = load_candles_csv(&path, Duration::minutes(15)).unwrap();
        assert_eq!(candles.len(), 2);
        // Sorted ascending.
        assert_eq!(
            candles[0].open_time,
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(
            candles[0].close_time,
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 14, 59).unwrap() + Duration::milliseconds(999)
        );
        assert_eq!(candles[1].open, 101.0);
    }

    #[test]
    fn explicit_close_time_and_insane_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "open_time,open,high,low,close,volume,close_time\n\
             2024-01-01 00:00:00,100,101,99,100.5,10,2024-01-01 00:14:59.999\n\
             2024-01-01 00:15:00,100,99,101,100.5,10,2024-01-01 00:29:59.999\n",
        );
        let candles = load_candles_csv(&path, Duration::minutes(15)).unwrap();
        assert_eq!(candles.len(), 1);
    }

    #[test]
    fn bad_time_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "open_time,open,high,low,close,volume\nsoon,100,101,99,100.5,10\n",
        );
        let err = load_candles_csv(&path, Duration::minutes(15)).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }
}
