//! Candle history collector: append the newest closed candle at each tick.

use anyhow::{Context, Result};
use tracing::{error, info};
use trendpilot_core::data::CandleSource;

use crate::scheduler::{Scheduler, Tick};
use crate::store::{CandleRecord, OrderStore};

#[derive(Debug)]
pub struct Collector<C, S> {
    symbol: String,
    interval: String,
    source: C,
    store: S,
}

impl<C: CandleSource, S: OrderStore> Collector<C, S> {
    pub fn new(symbol: &str, interval: &str, source: C, store: S) -> Self {
        Self {
            symbol: symbol.to_string(),
            interval: interval.to_string(),
            source,
            store,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Fetch and store the last closed candle. Returns the stored record, or
    /// `None` if nothing new arrived.
    pub fn collect_once(&mut self) -> Result<Option<CandleRecord>> {
        let candles = self
            .source
            .fetch_recent(&self.symbol, &self.interval, 2)
            .with_context(|| format!("failed to fetch {} candles", self.symbol))?;

        // The newest candle is still forming.
        let Some(closed) = candles.len().checked_sub(2).map(|i| &candles[i]) else {
            return Ok(None);
        };
        let record = CandleRecord::from_candle(&self.symbol, &self.interval, closed);
        let added = self
            .store
            .append_candle(&record)
            .context("failed to append candle")?;

        if added {
            info!(symbol = %self.symbol, at = %record.datetime, close = record.close, "stored candle");
            Ok(Some(record))
        } else {
            info!(symbol = %self.symbol, at = %record.datetime, "candle already stored, skipping");
            Ok(None)
        }
    }

    pub fn run(&mut self, scheduler: &mut Scheduler) {
        info!(symbol = %self.symbol, interval = %self.interval, cadence = ?scheduler.cadence(), "collector started");
        while let Tick::Due(_) = scheduler.next_tick() {
            if let Err(e) = self.collect_once() {
                error!(error = %format!("{e:#}"), "collection failed");
            }
        }
        info!("collector stopped");
    }
}
