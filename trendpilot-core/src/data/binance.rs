//! Binance spot klines provider.
//!
//! Fetches recent candles from `GET /api/v3/klines`. Each kline is an array
//! `[openTimeMs, "open", "high", "low", "close", "volume", closeTimeMs, ...]`
//! with prices and volume encoded as strings.
//!
//! There is no retry loop here: a failed fetch aborts the current cycle and
//! the scheduler tries again at the next boundary.

use std::time::Duration;

use chrono::DateTime;
use serde_json::Value;
use tracing::{debug, warn};

use super::provider::{CandleSource, DataError};
use crate::domain::Candle;

pub const DEFAULT_BASE_URL: &str = "https://api.binance.com";

/// Binance REST candle source.
pub struct BinanceProvider {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl BinanceProvider {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, DataError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("trendpilot/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DataError::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn klines_url(&self) -> String {
        format!("{}/api/v3/klines", self.base_url)
    }

    /// Parse a klines response body into candles.
    ///
    /// A row that does not parse means the format changed and fails the whole
    /// response. A row that parses but fails `Candle::is_sane` is dropped.
    pub fn parse_klines(body: &Value) -> Result<Vec<Candle>, DataError> {
        let rows = body.as_array().ok_or_else(|| {
            DataError::ResponseFormatChanged("klines response is not an array".into())
        })?;

        let mut candles = Vec::with_capacity(rows.len());
        for (i, row) in rows.iter().enumerate() {
            let candle = parse_kline(row).map_err(|e| annotate(e, i))?;
            if !candle.is_sane() {
                warn!(kline = i, open_time = %candle.open_time, "dropping insane candle");
                continue;
            }
            candles.push(candle);
        }
        Ok(candles)
    }
}

fn annotate(err: DataError, index: usize) -> DataError {
    match err {
        DataError::ResponseFormatChanged(msg) => {
            DataError::ResponseFormatChanged(format!("kline {index}: {msg}"))
        }
        other => other,
    }
}

fn parse_kline(row: &Value) -> Result<Candle, DataError> {
    let fields = row
        .as_array()
        .ok_or_else(|| DataError::ResponseFormatChanged("kline is not an array".into()))?;
    if fields.len() < 7 {
        return Err(DataError::ResponseFormatChanged(format!(
            "expected at least 7 fields, got {}",
            fields.len()
        )));
    }

    let open_time = millis_field(&fields[0], "open time")?;
    let close_time = millis_field(&fields[6], "close time")?;

    Ok(Candle {
        open_time,
        open: number_field(&fields[1], "open")?,
        high: number_field(&fields[2], "high")?,
        low: number_field(&fields[3], "low")?,
        close: number_field(&fields[4], "close")?,
        volume: number_field(&fields[5], "volume")?,
        close_time,
    })
}

fn millis_field(v: &Value, what: &str) -> Result<chrono::DateTime<chrono::Utc>, DataError> {
    let ms = v
        .as_i64()
        .ok_or_else(|| DataError::ResponseFormatChanged(format!("{what} is not an integer")))?;
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| DataError::ResponseFormatChanged(format!("{what} {ms} out of range")))
}

/// Prices arrive as strings; accept bare numbers too.
fn number_field(v: &Value, what: &str) -> Result<f64, DataError> {
    match v {
        Value::String(s) => s
            .parse::<f64>()
            .map_err(|_| DataError::ResponseFormatChanged(format!("{what} '{s}' is not a number"))),
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| DataError::ResponseFormatChanged(format!("{what} is not finite"))),
        _ => Err(DataError::ResponseFormatChanged(format!(
            "{what} has unexpected type"
        ))),
    }
}

impl CandleSource for BinanceProvider {
    fn name(&self) -> &str {
        "binance"
    }

    fn fetch_recent(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, DataError> {
        let limit = limit.to_string();
        let resp = self
            .client
            .get(self.klines_url())
            .query(&[("symbol", symbol), ("interval", interval), ("limit", &limit)])
            .send()
            .map_err(|e| DataError::NetworkUnreachable(e.to_string()))?;

        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.as_u16() == 418 {
            let retry_after_secs = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(DataError::RateLimited { retry_after_secs });
        }
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(DataError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = resp.json().map_err(|e| {
            DataError::ResponseFormatChanged(format!("failed to parse klines for {symbol}: {e}"))
        })?;
        let candles = Self::parse_klines(&body)?;
        debug!(symbol, interval, count = candles.len(), "fetched klines");
        Ok(candles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_string_encoded_klines() {
        let body = json!([
            [1704067200000_i64, "42000.10", "42100.00", "41950.50", "42050.00", "12.5",
             1704068099999_i64, "525000.0", 100, "6.1", "256000.0", "0"],
            [1704068100000_i64, "42050.00", "42080.00", "42000.00", "42010.00", "8.25",
             1704068999999_i64, "346000.0", 80, "4.0", "168000.0", "0"]
        ]);

        let candles = BinanceProvider::parse_klines(&body).unwrap();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].open, 42000.10);
        assert_eq!(candles[0].volume, 12.5);
        assert_eq!(candles[0].open_time_str(), "2024-01-01 00:00:00.000000");
        assert_eq!(candles[1].close, 42010.00);
    }

    #[test]
    fn empty_response_is_no_data() {
        assert!(BinanceProvider::parse_klines(&json!([])).unwrap().is_empty());
    }

    #[test]
    fn drops_insane_rows_and_keeps_the_rest() {
        let body = json!([
            [1704067200000_i64, "100", "101", "99", "100.5", "1", 1704068099999_i64],
            // close time not after open time
            [1704068100000_i64, "100", "101", "99", "100.5", "1", 1704068100000_i64],
            // high below close
            [1704069000000_i64, "100", "100.2", "99", "100.5", "1", 1704069899999_i64],
            [1704069900000_i64, "100.5", "102", "100", "101", "2", 1704070799999_i64]
        ]);
        let candles = BinanceProvider::parse_klines(&body).unwrap();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].open, 100.0);
        assert_eq!(candles[1].close, 101.0);
    }

    #[test]
    fn rejects_malformed_rows() {
        assert!(BinanceProvider::parse_klines(&json!({"code": -1121})).is_err());
        assert!(BinanceProvider::parse_klines(&json!([[1, "2"]])).is_err());
        let bad_price = json!([[1704067200000_i64, "abc", "1", "1", "1", "1", 1704068099999_i64]]);
        assert!(matches!(
            BinanceProvider::parse_klines(&bad_price),
            Err(DataError::ResponseFormatChanged(msg)) if msg.contains("open")
        ));
    }

    #[test]
    fn url_is_normalised() {
        let provider =
            BinanceProvider::new("https://api.binance.com/", Duration::from_secs(5)).unwrap();
        assert_eq!(provider.klines_url(), "https://api.binance.com/api/v3/klines");
    }
}
