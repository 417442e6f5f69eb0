//! Strategy evaluator: the per-cycle decision state machine.
//!
//! One cycle looks at the current (still-forming) candle `c` and the last
//! closed candle `c - 1`. Indicators and candle-shape filters are read at
//! `c - 1`; every transition executes at the open price and open time of `c`.
//! Steps run in a fixed order:
//!
//! 1. monthly gate (paused trading waits for a month change)
//! 2. cooldown gate
//! 3. open long
//! 4. close long
//! 5. open short
//! 6. close short

pub mod filters;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::account::{AccountError, CloseResult, OpenResult, RiskAccount, RiskParams};
use crate::domain::{Candle, OrderRecord, PositionState, PriceSource, Side};
use crate::indicators::IndicatorSet;

/// Indicator periods, thresholds and filter switches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategySettings {
    pub ema_period: usize,
    pub ma_period: usize,
    pub trend_fast_period: usize,
    pub trend_slow_period: usize,
    pub adx_period: usize,
    pub adx_filter: bool,
    pub adx_threshold: f64,
    /// Minimum `|EMA - MA| / MA` for the volatility filter.
    pub gap_threshold: f64,
    /// Minimum `|close - open| / open` of the closed candle for the volatility filter.
    pub move_threshold: f64,
    pub conviction_filter: bool,
    pub volume_multiplier: f64,
    pub volume_lookback: usize,
    pub min_body_ratio: f64,
    pub price_source: PriceSource,
}

impl Default for StrategySettings {
    fn default() -> Self {
        Self {
            ema_period: 14,
            ma_period: 50,
            trend_fast_period: 130,
            trend_slow_period: 200,
            adx_period: 14,
            adx_filter: true,
            adx_threshold: 20.5,
            gap_threshold: 0.0015,
            move_threshold: 0.003,
            conviction_filter: true,
            volume_multiplier: 1.2,
            volume_lookback: 15,
            min_body_ratio: 0.6,
            price_source: PriceSource::Open,
        }
    }
}

impl StrategySettings {
    /// Candles needed before every series the evaluator reads can be defined.
    pub fn warmup(&self) -> usize {
        [
            self.ema_period,
            self.ma_period,
            self.trend_fast_period,
            self.trend_slow_period,
            2 * self.adx_period,
            self.volume_lookback + 1,
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
    }
}

/// Position plus account: everything a run mutates.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyContext {
    pub position: PositionState,
    pub account: RiskAccount,
}

impl StrategyContext {
    pub fn new(params: RiskParams) -> Self {
        Self {
            position: PositionState::Flat,
            account: RiskAccount::new(params),
        }
    }

    /// Restore the open position recorded before a restart.
    pub fn rehydrate(&mut self, record: &OrderRecord) -> Result<(), AccountError> {
        self.account.rehydrate(record, &mut self.position)
    }

    pub fn total_balance(&self) -> f64 {
        self.account.total_balance(&self.position)
    }
}

/// Port through which the evaluator reports transitions (persistence,
/// notification, trade logging). The account never sees it.
pub trait TradeSink {
    /// Called after an open. May return the id under which it was recorded.
    fn on_open(&mut self, opened: &OpenResult) -> Option<i64>;

    fn on_close(&mut self, closed: &CloseResult);
}

/// Sink that discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl TradeSink for NullSink {
    fn on_open(&mut self, _opened: &OpenResult) -> Option<i64> {
        None
    }

    fn on_close(&mut self, _closed: &CloseResult) {}
}

impl<S: TradeSink + ?Sized> TradeSink for &mut S {
    fn on_open(&mut self, opened: &OpenResult) -> Option<i64> {
        (**self).on_open(opened)
    }

    fn on_close(&mut self, closed: &CloseResult) {
        (**self).on_close(closed)
    }
}

/// A transition taken during one cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Opened(OpenResult),
    Closed(CloseResult),
    /// The conditions held but the account refused the transition.
    Rejected { side: Side, error: AccountError },
}

/// Why a cycle stopped before the transition steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No closed candle before the current one.
    NotEnoughCandles,
    /// Trading is paused and the month has not changed yet.
    TradingPaused,
    /// Cooldown consumed one cycle; `remaining` cycles are left.
    Cooldown { remaining: u32 },
}

/// Everything that happened in one evaluation cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleOutcome {
    pub index: usize,
    pub month_rolled: bool,
    pub skipped: Option<SkipReason>,
    pub decisions: Vec<Decision>,
}

impl CycleOutcome {
    pub fn opened(&self) -> impl Iterator<Item = &OpenResult> {
        self.decisions.iter().filter_map(|d| match d {
            Decision::Opened(o) => Some(o),
            _ => None,
        })
    }

    pub fn closed(&self) -> impl Iterator<Item = &CloseResult> {
        self.decisions.iter().filter_map(|d| match d {
            Decision::Closed(c) => Some(c),
            _ => None,
        })
    }

    pub fn is_idle(&self) -> bool {
        self.decisions.is_empty()
    }
}

/// Runs the decision state machine against a [`StrategyContext`].
pub struct StrategyEvaluator<S> {
    settings: StrategySettings,
    sink: S,
}

impl<S: TradeSink> StrategyEvaluator<S> {
    pub fn new(settings: StrategySettings, sink: S) -> Self {
        Self { settings, sink }
    }

    pub fn settings(&self) -> &StrategySettings {
        &self.settings
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Evaluate one cycle with `current` as the index of the forming candle.
    ///
    /// `indicators` must have been computed over the same `candles`.
    pub fn evaluate(
        &mut self,
        ctx: &mut StrategyContext,
        candles: &[Candle],
        indicators: &IndicatorSet,
        current: usize,
    ) -> CycleOutcome {
        let mut outcome = CycleOutcome {
            index: current,
            ..CycleOutcome::default()
        };

        if current == 0 || current >= candles.len() {
            outcome.skipped = Some(SkipReason::NotEnoughCandles);
            return outcome;
        }
        let forming = &candles[current];
        let closed = &candles[current - 1];
        let snap = indicators.snapshot(current - 1);
        let price = forming.open;
        let time = forming.open_time_str();

        // 1. Monthly gate
        if !ctx.account.trading_enabled {
            if forming.month() != closed.month() {
                let (year, month) = closed.month();
                ctx.account.begin_new_month(year, month);
                outcome.month_rolled = true;
            } else {
                debug!(time = %time, "trading paused for the rest of the month");
                outcome.skipped = Some(SkipReason::TradingPaused);
                return outcome;
            }
        }

        // 2. Cooldown gate
        if ctx.account.tick_cooldown() {
            let remaining = ctx.account.cooldown_until_index;
            debug!(remaining, "cooldown cycle skipped");
            outcome.skipped = Some(SkipReason::Cooldown { remaining });
            return outcome;
        }

        debug!(
            index = current,
            price,
            ema = ?snap.ema,
            ma = ?snap.ma,
            trend_fast = ?snap.trend_fast,
            trend_slow = ?snap.trend_slow,
            adx = ?snap.adx,
            "evaluating"
        );

        for side in [Side::Long, Side::Short] {
            // 3 / 5. Open
            if ctx.position.is_flat()
                && self.may_open(&ctx.account)
                && filters::should_open(side, &snap, closed, &self.settings)
            {
                match ctx
                    .account
                    .open_position(side, price, &time, &mut ctx.position)
                {
                    Ok(opened) => {
                        let order_id = self.sink.on_open(&opened);
                        if let Some(open) = ctx.position.open_position_mut() {
                            open.order_id = order_id;
                        }
                        outcome.decisions.push(Decision::Opened(opened));
                    }
                    Err(error) => {
                        warn!(side = %side, error = %error, "open rejected");
                        outcome.decisions.push(Decision::Rejected { side, error });
                    }
                }
            }

            // 4 / 6. Close
            if ctx.position.is_side(side) && filters::should_close(side, &snap) {
                match ctx
                    .account
                    .close_position(side, price, &time, &mut ctx.position)
                {
                    Ok(closed_trade) => {
                        self.sink.on_close(&closed_trade);
                        outcome.decisions.push(Decision::Closed(closed_trade));
                    }
                    Err(error) => {
                        warn!(side = %side, error = %error, "close rejected");
                        outcome.decisions.push(Decision::Rejected { side, error });
                    }
                }
            }
        }

        if outcome.month_rolled && outcome.is_idle() {
            info!(time = %time, "month boundary observed, no transition");
        }

        outcome
    }

    /// A close earlier in the cycle may have paused trading or set a cooldown.
    fn may_open(&self, account: &RiskAccount) -> bool {
        account.trading_enabled && account.cooldown_until_index == 0
    }
}
