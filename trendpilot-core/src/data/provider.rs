//! Candle source trait and structured error types.
//!
//! The CandleSource trait abstracts over where candles come from (the
//! exchange REST API, a synthetic generator, a test fixture) so the live
//! cycle can be driven by any of them.

use chrono::Duration;
use thiserror::Error;

use crate::domain::Candle;

/// Structured error types for candle fetching.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("provider returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("unsupported interval '{0}'")]
    UnsupportedInterval(String),

    #[error("data error: {0}")]
    Other(String),
}

/// Source of recent candles for one symbol.
pub trait CandleSource {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    /// The most recent `limit` candles, oldest first. The last one may still
    /// be forming. No data is `Ok(vec![])`; transport failures are errors.
    fn fetch_recent(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, DataError>;
}

impl<T: CandleSource + ?Sized> CandleSource for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn fetch_recent(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, DataError> {
        (**self).fetch_recent(symbol, interval, limit)
    }
}

/// Parse an exchange interval label (`1m`, `15m`, `1h`, `4h`, `1d`).
pub fn parse_interval(interval: &str) -> Result<Duration, DataError> {
    let unsupported = || DataError::UnsupportedInterval(interval.to_string());
    let unit = interval.chars().last().ok_or_else(unsupported)?;
    let amount: i64 = interval[..interval.len() - unit.len_utf8()]
        .parse()
        .map_err(|_| unsupported())?;
    if amount <= 0 {
        return Err(unsupported());
    }
    match unit {
        'm' => Ok(Duration::minutes(amount)),
        'h' => Ok(Duration::hours(amount)),
        'd' => Ok(Duration::days(amount)),
        'w' => Ok(Duration::weeks(amount)),
        _ => Err(unsupported()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_intervals() {
        assert_eq!(parse_interval("15m").unwrap(), Duration::minutes(15));
        assert_eq!(parse_interval("4h").unwrap(), Duration::hours(4));
        assert_eq!(parse_interval("1d").unwrap(), Duration::days(1));
    }

    #[test]
    fn rejects_garbage_intervals() {
        for bad in ["", "m", "0m", "-5m", "15x", "quarter"] {
            assert!(
                matches!(parse_interval(bad), Err(DataError::UnsupportedInterval(_))),
                "{bad} should be rejected"
            );
        }
    }
}
