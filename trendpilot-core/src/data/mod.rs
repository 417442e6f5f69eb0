//! Candle sources: the exchange REST client and a synthetic generator.

pub mod binance;
pub mod provider;
pub mod synthetic;

pub use binance::BinanceProvider;
pub use provider::{parse_interval, CandleSource, DataError};
pub use synthetic::{synthetic_candles, SyntheticSource};
