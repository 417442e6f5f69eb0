//! Live trading cycle: fetch, compute, decide, persist, notify.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{error, info, warn};
use trendpilot_core::account::{AccountSummary, CloseResult, OpenResult};
use trendpilot_core::data::CandleSource;
use trendpilot_core::indicators::IndicatorSet;
use trendpilot_core::strategy::{CycleOutcome, StrategyContext, StrategyEvaluator, TradeSink};

use crate::notify::{Notifier, TradeEvent};
use crate::scheduler::{Scheduler, Tick};
use crate::settings::Settings;
use crate::store::{CandleRecord, OrderStore};
use crate::trade_log::{TradeLog, TradeLogRow};

/// Trade sink that writes every transition to a store, a notifier and the
/// trade log. Store and notifier failures are logged and dropped; the
/// in-memory transition has already happened and is never rolled back.
#[derive(Debug)]
pub struct PersistingSink<S, N> {
    symbol: String,
    trade_amount_percent: f64,
    store: S,
    notifier: N,
    trade_log: TradeLog,
}

impl<S: OrderStore, N: Notifier> PersistingSink<S, N> {
    pub fn new(symbol: &str, trade_amount_percent: f64, store: S, notifier: N) -> Self {
        Self {
            symbol: symbol.to_string(),
            trade_amount_percent,
            store,
            notifier,
            trade_log: TradeLog::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn trade_log(&self) -> &TradeLog {
        &self.trade_log
    }

    pub fn into_parts(self) -> (S, TradeLog) {
        (self.store, self.trade_log)
    }

    fn send(&self, event: TradeEvent) {
        if let Err(e) = self.notifier.notify(&event) {
            warn!(event = %event.title(), error = %e, "notification failed");
        }
    }
}

impl<S: OrderStore, N: Notifier> TradeSink for PersistingSink<S, N> {
    fn on_open(&mut self, opened: &OpenResult) -> Option<i64> {
        let order_id = match self.store.insert_open(&opened.to_new_order(&self.symbol)) {
            Ok(id) => Some(id),
            Err(e) => {
                error!(side = %opened.side, error = %e, "failed to persist open order");
                None
            }
        };
        self.send(TradeEvent::opened(&self.symbol, opened));
        order_id
    }

    fn on_close(&mut self, closed: &CloseResult) {
        match closed.order_id {
            Some(id) => {
                if let Err(e) = self.store.update_close(id, &closed.to_order_close()) {
                    error!(order_id = id, error = %e, "failed to persist close, in-memory state kept");
                }
            }
            None => warn!(side = %closed.side, "closed a position with no stored order"),
        }
        self.trade_log
            .record(TradeLogRow::from_close(closed, self.trade_amount_percent));
        self.send(TradeEvent::closed(&self.symbol, closed));
    }
}

/// The single-symbol live trader.
pub struct LiveTrader<C, S, N> {
    settings: Settings,
    ctx: StrategyContext,
    evaluator: StrategyEvaluator<PersistingSink<S, N>>,
    source: C,
    trade_log_path: Option<PathBuf>,
}

impl<C: CandleSource, S: OrderStore, N: Notifier> LiveTrader<C, S, N> {
    pub fn new(settings: Settings, source: C, store: S, notifier: N) -> Self {
        let sink = PersistingSink::new(
            &settings.market.symbol,
            settings.risk.trade_amount_percent,
            store,
            notifier,
        );
        Self {
            ctx: StrategyContext::new(settings.risk.clone()),
            evaluator: StrategyEvaluator::new(settings.strategy.clone(), sink),
            trade_log_path: Some(settings.storage.trade_log_path()),
            settings,
            source,
        }
    }

    /// Write the trade log somewhere else, or nowhere.
    pub fn with_trade_log_path(mut self, path: Option<PathBuf>) -> Self {
        self.trade_log_path = path;
        self
    }

    pub fn context(&self) -> &StrategyContext {
        &self.ctx
    }

    pub fn sink(&self) -> &PersistingSink<S, N> {
        self.evaluator.sink()
    }

    pub fn summary(&self) -> AccountSummary {
        self.ctx.account.summary()
    }

    /// Restore any position left open by a previous run.
    ///
    /// Statistics are not restored; a restarted run counts from zero.
    pub fn startup(&mut self) -> Result<()> {
        let open = self
            .evaluator
            .sink()
            .store()
            .latest_open()
            .context("failed to read open order")?;

        match open {
            Some(record) => {
                self.ctx
                    .rehydrate(&record)
                    .with_context(|| format!("failed to restore order {}", record.id))?;
                info!(
                    order_id = record.id,
                    side = %record.side,
                    balance = self.ctx.account.balance,
                    "resumed open position"
                );
            }
            None => info!(balance = self.ctx.account.balance, "starting flat"),
        }
        Ok(())
    }

    /// One full cycle. Transport errors abort the cycle and are returned.
    pub fn run_cycle(&mut self) -> Result<CycleOutcome> {
        let market = &self.settings.market;
        let candles = self
            .source
            .fetch_recent(&market.symbol, &market.interval, market.candle_limit)
            .with_context(|| format!("failed to fetch {} candles", market.symbol))?;

        let warmup = self.settings.strategy.warmup();
        if candles.len() <= warmup {
            warn!(
                received = candles.len(),
                warmup, "fewer candles than the indicator warm-up"
            );
        }

        // The last candle is still forming; the one before it just closed.
        if candles.len() >= 2 {
            let closed = &candles[candles.len() - 2];
            let record = CandleRecord::from_candle(&market.symbol, &market.interval, closed);
            if let Err(e) = self.evaluator.sink_mut().store_mut().append_candle(&record) {
                warn!(error = %e, "failed to append candle history");
            }
        }

        let indicators = IndicatorSet::compute(&candles, &self.settings.strategy);
        let current = candles.len().saturating_sub(1);
        let outcome = self
            .evaluator
            .evaluate(&mut self.ctx, &candles, &indicators, current);

        if outcome.closed().next().is_some() {
            self.save_trade_log();
        }

        info!(
            index = current,
            price = candles.get(current).map(|c| c.open),
            position = ?self.ctx.position.side(),
            balance = self.ctx.account.balance,
            total_balance = self.ctx.total_balance(),
            skipped = ?outcome.skipped,
            decisions = outcome.decisions.len(),
            "cycle complete"
        );
        Ok(outcome)
    }

    fn save_trade_log(&self) {
        let Some(path) = &self.trade_log_path else {
            return;
        };
        let log = self.evaluator.sink().trade_log();
        if let Err(e) = log.save(path, &self.ctx.account.summary()) {
            warn!(path = %path.display(), error = %e, "failed to write trade log");
        }
    }

    /// Run cycles until the scheduler reports shutdown. A failed cycle is
    /// logged and retried at the next tick.
    pub fn run(&mut self, scheduler: &mut Scheduler) {
        info!(
            symbol = %self.settings.market.symbol,
            interval = %self.settings.market.interval,
            cadence = ?scheduler.cadence(),
            "live loop started"
        );
        loop {
            match scheduler.next_tick() {
                Tick::Shutdown => break,
                Tick::Due(at) => {
                    if let Err(e) = self.run_cycle() {
                        error!(at = %at, error = %format!("{e:#}"), "cycle failed, retrying at next boundary");
                    }
                }
            }
        }
        let summary = self.summary();
        info!(
            balance = summary.final_balance,
            save_money = summary.save_money,
            closed_trades = summary.closed_trades,
            "live loop stopped"
        );
    }
}

impl<C, S, N> std::fmt::Debug for LiveTrader<C, S, N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveTrader")
            .field("symbol", &self.settings.market.symbol)
            .field("position", &self.ctx.position.side())
            .field("balance", &self.ctx.account.balance)
            .finish_non_exhaustive()
    }
}
