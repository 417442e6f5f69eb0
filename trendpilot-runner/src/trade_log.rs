//! CSV trade log: one row per closed trade plus a trailing SUMMARY row.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use trendpilot_core::account::{AccountSummary, CloseResult};
use trendpilot_core::calendar::{trade_duration, TradeDuration};

const HEADER: [&str; 20] = [
    "type",
    "open_time",
    "close_time",
    "entry_price",
    "close_price",
    "balance_before",
    "balance_after",
    "amount",
    "leverage",
    "trade_amount_percent",
    "profit",
    "profit_percent",
    "pnl_percent",
    "fee_paid",
    "duration_minutes_total",
    "duration_days",
    "duration_hours",
    "duration_minutes",
    "save_money",
    "profit_percent_per_month",
];

/// One closed trade as it appears in the log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeLogRow {
    pub kind: String,
    pub open_time: String,
    pub close_time: String,
    pub entry_price: f64,
    pub close_price: f64,
    pub balance_before: f64,
    pub balance_after: f64,
    pub amount: f64,
    pub leverage: u32,
    pub trade_amount_percent: f64,
    pub profit: f64,
    pub profit_percent: f64,
    pub pnl_percent: f64,
    pub fee: f64,
    pub duration: TradeDuration,
    pub save_money: f64,
    pub profit_percent_per_month: f64,
}

impl TradeLogRow {
    pub fn from_close(closed: &CloseResult, trade_amount_percent: f64) -> Self {
        Self {
            kind: closed.side.as_str().to_string(),
            open_time: closed.open_time.clone(),
            close_time: closed.close_time.clone(),
            entry_price: closed.entry_price,
            close_price: closed.close_price,
            balance_before: closed.balance_before_trade,
            balance_after: closed.balance_after_trade,
            amount: closed.margin,
            leverage: closed.leverage,
            trade_amount_percent,
            profit: closed.profit,
            profit_percent: closed.profit_percent,
            pnl_percent: closed.pnl_percent,
            fee: closed.fee,
            duration: closed.duration.unwrap_or_default(),
            save_money: closed.save_money_at_close,
            profit_percent_per_month: closed.profit_percent_per_month,
        }
    }

    fn to_record(&self) -> Vec<String> {
        vec![
            self.kind.clone(),
            self.open_time.clone(),
            self.close_time.clone(),
            self.entry_price.to_string(),
            self.close_price.to_string(),
            format!("{:.6}", self.balance_before),
            format!("{:.6}", self.balance_after),
            format!("{:.6}", self.amount),
            self.leverage.to_string(),
            self.trade_amount_percent.to_string(),
            format!("{:.6}", self.profit),
            format!("{:.4}", self.profit_percent),
            format!("{:.4}", self.pnl_percent),
            format!("{:.6}", self.fee),
            self.duration.total_minutes().to_string(),
            self.duration.days.to_string(),
            self.duration.hours.to_string(),
            self.duration.minutes.to_string(),
            format!("{:.6}", self.save_money),
            format!("{:.4}", self.profit_percent_per_month),
        ]
    }
}

/// Accumulates closed trades for export.
#[derive(Debug, Clone, Default)]
pub struct TradeLog {
    rows: Vec<TradeLogRow>,
}

impl TradeLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, row: TradeLogRow) {
        self.rows.push(row);
    }

    pub fn rows(&self) -> &[TradeLogRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Render the log as CSV. The SUMMARY row spans first open to last close.
    pub fn to_csv(&self, summary: &AccountSummary) -> Result<String> {
        let mut wtr = csv::Writer::from_writer(vec![]);
        wtr.write_record(HEADER)?;
        for row in &self.rows {
            wtr.write_record(row.to_record())?;
        }

        let start = self.rows.first().map(|r| r.open_time.as_str()).unwrap_or("");
        let end = self.rows.last().map(|r| r.close_time.as_str()).unwrap_or("");
        let span = trade_duration(start, end).unwrap_or_default();
        wtr.write_record([
            "SUMMARY".to_string(),
            start.to_string(),
            end.to_string(),
            String::new(),
            String::new(),
            format!("{:.6}", summary.first_balance),
            format!("{:.6}", summary.final_balance),
            String::new(),
            String::new(),
            String::new(),
            format!("{:.6}", summary.total_profit),
            format!("{:.4}", summary.total_profit_percent),
            String::new(),
            format!("{:.6}", summary.fees_paid),
            String::new(),
            span.days.to_string(),
            span.hours.to_string(),
            span.minutes.to_string(),
            String::new(),
            String::new(),
        ])?;

        let data = wtr.into_inner().context("failed to flush CSV writer")?;
        String::from_utf8(data).context("CSV output is not valid UTF-8")
    }

    /// Write the whole log plus a fresh `SUMMARY` row, replacing the file.
    ///
    /// The trailing summary changes on every close, so the file is rewritten
    /// rather than appended to. Rows stay in memory for the life of the run;
    /// at a few trades a day that is a few hundred bytes per trade.
    pub fn save(&self, path: &Path, summary: &AccountSummary) -> Result<()> {
        let csv = self.to_csv(summary)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        fs::write(path, csv).with_context(|| format!("failed to write {}", path.display()))
    }
}
