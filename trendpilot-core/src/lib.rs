//! Trendpilot Core: indicators, position state, risk account, strategy evaluator.
//!
//! This crate contains the decision engine of the trading-signal bot:
//! - Domain types (candles, positions, persisted order records)
//! - Indicator engine (MA, EMA, ADX) with exact rounding semantics
//! - Risk account with tiered sizing, fees, cooldown, reserve and monthly settlement
//! - Per-cycle strategy state machine with an injected trade sink
//! - Candle sources (Binance REST, synthetic)
//!
//! Nothing in here sleeps, persists or notifies; the runner crate does that.

pub mod account;
pub mod calendar;
pub mod data;
pub mod domain;
pub mod indicators;
pub mod strategy;
