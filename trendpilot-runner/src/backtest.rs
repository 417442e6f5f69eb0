//! Offline replay of a candle series through the live decision path.
//!
//! The evaluator, account and sink are the same ones the live loop uses;
//! only the store (in memory) and the notifier (silent) differ. Indicators
//! are computed once over the whole series, which is equivalent to
//! recomputing them each cycle because every series is causal.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use trendpilot_core::account::{AccountSummary, MonthlyRecord};
use trendpilot_core::domain::{Candle, OrderRecord};
use trendpilot_core::indicators::IndicatorSet;
use trendpilot_core::strategy::{StrategyContext, StrategyEvaluator};

use crate::live::PersistingSink;
use crate::notify::NullNotifier;
use crate::settings::Settings;
use crate::store::{CandleRecord, MemoryStore, OrderStore};
use crate::trade_log::TradeLog;

/// Bump when the shape of `summary.json` changes.
pub const REPORT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestReport {
    pub schema_version: u32,
    pub symbol: String,
    pub interval: String,
    /// Hash of the strategy and risk settings the run used.
    pub fingerprint: String,
    pub candles: usize,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub summary: AccountSummary,
    pub monthly: Vec<MonthlyRecord>,
    /// True if the run ended with a position still open.
    pub open_at_end: bool,
    pub orders: Vec<OrderRecord>,
    #[serde(skip)]
    pub trade_log: TradeLog,
}

/// Replay `candles` (oldest first) under `settings`.
pub fn run_backtest(candles: &[Candle], settings: &Settings) -> BacktestReport {
    let indicators = IndicatorSet::compute(candles, &settings.strategy);
    let sink = PersistingSink::new(
        &settings.market.symbol,
        settings.risk.trade_amount_percent,
        MemoryStore::new(),
        NullNotifier,
    );
    let mut ctx = StrategyContext::new(settings.risk.clone());
    let mut evaluator = StrategyEvaluator::new(settings.strategy.clone(), sink);

    for current in 1..candles.len() {
        evaluator.evaluate(&mut ctx, candles, &indicators, current);
    }

    let (store, trade_log) = evaluator.into_sink().into_parts();
    let orders = store.all_orders().unwrap_or_default();
    let summary = ctx.account.summary();
    info!(
        candles = candles.len(),
        closed_trades = summary.closed_trades,
        final_balance = summary.final_balance,
        net_profit_percent = summary.net_profit_percent,
        "backtest complete"
    );

    BacktestReport {
        schema_version: REPORT_VERSION,
        symbol: settings.market.symbol.clone(),
        interval: settings.market.interval.clone(),
        fingerprint: settings.fingerprint(),
        candles: candles.len(),
        start: candles.first().map(|c| c.open_time),
        end: candles.last().map(|c| c.open_time),
        summary,
        monthly: ctx.account.monthly_history.clone(),
        open_at_end: !ctx.position.is_flat(),
        orders,
        trade_log,
    }
}

/// Candles from stored history for one symbol and interval, oldest first.
pub fn candles_from_history(records: &[CandleRecord], symbol: &str, interval: &str) -> Vec<Candle> {
    let mut candles: Vec<Candle> = records
        .iter()
        .filter(|r| r.symbol == symbol && r.interval == interval)
        .filter_map(CandleRecord::to_candle)
        .collect();
    candles.sort_by_key(|c| c.open_time);
    candles.dedup_by_key(|c| c.open_time);
    candles
}

/// Write `summary.json` and `trades.csv` under `out_dir/{symbol}_{fingerprint}`.
///
/// Returns the run directory.
pub fn save_report(report: &BacktestReport, out_dir: &Path) -> Result<PathBuf> {
    if report.fingerprint.len() < 12 {
        bail!("report fingerprint '{}' is too short", report.fingerprint);
    }
    let run_dir = out_dir.join(format!("{}_{}", report.symbol, &report.fingerprint[..12]));
    fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create {}", run_dir.display()))?;

    let json = serde_json::to_string_pretty(report).context("failed to serialize report")?;
    fs::write(run_dir.join("summary.json"), json).context("failed to write summary.json")?;
    report
        .trade_log
        .save(&run_dir.join("trades.csv"), &report.summary)?;

    Ok(run_dir)
}
