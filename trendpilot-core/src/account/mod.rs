//! Risk account: balance bookkeeping under leverage and fees.
//!
//! The account owns every piece of money-management state (working balance,
//! fee-free shadow balance, tactical baseline, reserve, cooldown counter and
//! the monthly trading switch). Position transitions go through
//! [`RiskAccount::open_position`] and [`RiskAccount::close_position`], which
//! mutate the account and the [`PositionState`] together and report what
//! happened as plain result structs.

mod error;
mod stats;

pub use error::AccountError;
pub use stats::{AccountSummary, MonthlyRecord, TradeStats};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::calendar::{trade_duration, TradeDuration};
use crate::domain::{NewOrder, OpenPosition, OrderClose, OrderRecord, PositionState, Side};

/// Fraction of the tactical balance above which margin is sized off the baseline.
const MARGIN_TIER_FRACTION: f64 = 0.5;
/// Total balance at or below this fraction of the baseline drops to low leverage.
const LEVERAGE_TIER_FRACTION: f64 = 0.9;
/// Balance below this fraction of the baseline pulls from the reserve.
const RESERVE_TRIGGER_FRACTION: f64 = 0.75;
/// Size of one reserve transfer, as a fraction of the baseline.
const RESERVE_TRANSFER_FRACTION: f64 = 0.25;

/// Money-management parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskParams {
    /// Starting balance of a fresh run.
    pub first_balance: f64,
    /// Initial tactical baseline.
    pub tactical_balance: f64,
    /// Fraction of the sizing base committed as margin, in (0, 1].
    pub trade_amount_percent: f64,
    /// Fee charged per side on notional value.
    pub fee_rate: f64,
    /// Number of cycles to skip after an outsized win.
    pub cooldown_after_big_pnl: u32,
    /// Unleveraged pnl percent that triggers the cooldown.
    pub big_pnl_threshold: f64,
    pub high_leverage: u32,
    pub low_leverage: u32,
    /// Lock in profit once the month reaches the stop percent.
    pub monthly_close_filter: bool,
    pub monthly_profit_stop_percent: f64,
    /// Growth applied to the tactical baseline at settlement, in percent.
    pub monthly_compound_percent: f64,
}

impl Default for RiskParams {
    fn default() -> Self {
        Self {
            first_balance: 1000.0,
            tactical_balance: 1000.0,
            trade_amount_percent: 0.1,
            fee_rate: 0.0005,
            cooldown_after_big_pnl: 8,
            big_pnl_threshold: 4.0,
            high_leverage: 5,
            low_leverage: 3,
            monthly_close_filter: true,
            monthly_profit_stop_percent: 6.0,
            monthly_compound_percent: 3.0,
        }
    }
}

/// What an open did to the account.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpenResult {
    pub side: Side,
    pub entry_price: f64,
    pub open_time: String,
    pub margin: f64,
    pub margin_no_fee: f64,
    pub leverage: u32,
    pub position_value: f64,
    pub position_size: f64,
    pub position_value_no_fee: f64,
    pub position_size_no_fee: f64,
    /// Balances after the margin debit.
    pub balance: f64,
    pub balance_without_fee: f64,
    pub balance_before_trade: f64,
    pub balance_before_trade_no_fee: f64,
}

impl OpenResult {
    /// The persisted form of this open.
    pub fn to_new_order(&self, symbol: &str) -> NewOrder {
        NewOrder {
            symbol: symbol.to_string(),
            side: self.side,
            entry_price: self.entry_price,
            open_time: self.open_time.clone(),
            position_size: self.position_size,
            position_size_no_fee: self.position_size_no_fee,
            margin: self.margin,
            margin_no_fee: self.margin_no_fee,
            leverage: self.leverage,
            balance: self.balance,
            balance_without_fee: self.balance_without_fee,
            balance_before_trade: self.balance_before_trade,
            balance_before_trade_no_fee: self.balance_before_trade_no_fee,
        }
    }
}

/// Month-end profit lock applied during a close.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Settlement {
    pub previous_tactical: f64,
    pub new_tactical: f64,
    /// Surplus moved into the reserve (negative if the balance fell short of
    /// the compounded baseline).
    pub moved_to_reserve: f64,
}

/// What a close did to the account.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CloseResult {
    pub side: Side,
    pub order_id: Option<i64>,
    pub entry_price: f64,
    pub close_price: f64,
    pub open_time: String,
    pub close_time: String,
    pub margin: f64,
    pub leverage: u32,
    pub position_size: f64,
    pub pnl: f64,
    pub pnl_no_fee: f64,
    pub pnl_percent: f64,
    pub fee: f64,
    pub profit: f64,
    pub profit_percent: f64,
    pub profit_percent_per_month: f64,
    pub balance_before_trade: f64,
    pub balance_before_trade_no_fee: f64,
    /// Balance right after the trade settled, before reserve and month-end moves.
    pub balance_after_trade: f64,
    /// Final balances once every post-close rule has run.
    pub balance: f64,
    pub balance_without_fee: f64,
    /// Reserve as it stood when the trade settled.
    pub save_money_at_close: f64,
    pub duration: Option<TradeDuration>,
    pub cooldown_activated: bool,
    /// Amount pulled from the reserve, if any.
    pub replenished: Option<f64>,
    pub settlement: Option<Settlement>,
}

impl CloseResult {
    /// The fields written back onto the persisted order.
    pub fn to_order_close(&self) -> OrderClose {
        OrderClose {
            close_price: self.close_price,
            close_time: self.close_time.clone(),
            profit: self.profit,
            profit_percent: self.profit_percent,
            balance: self.balance,
            balance_without_fee: self.balance_without_fee,
        }
    }
}

/// Process-wide money-management state for one running strategy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskAccount {
    params: RiskParams,
    pub balance: f64,
    pub balance_without_fee: f64,
    pub tactical_balance: f64,
    pub save_money: f64,
    /// Cycles left during which the evaluator skips all transitions.
    pub cooldown_until_index: u32,
    pub trading_enabled: bool,
    pub profit_percent_per_month: f64,
    pub stats: TradeStats,
    pub monthly_history: Vec<MonthlyRecord>,
}

impl RiskAccount {
    pub fn new(params: RiskParams) -> Self {
        Self {
            balance: params.first_balance,
            balance_without_fee: params.first_balance,
            tactical_balance: params.tactical_balance,
            save_money: 0.0,
            cooldown_until_index: 0,
            trading_enabled: true,
            profit_percent_per_month: 0.0,
            stats: TradeStats::default(),
            monthly_history: Vec::new(),
            params,
        }
    }

    pub fn params(&self) -> &RiskParams {
        &self.params
    }

    /// Free balance plus any margin locked in the open position.
    pub fn total_balance(&self, position: &PositionState) -> f64 {
        self.balance + position.locked_margin()
    }

    /// Margin for a new position under the two-tier sizing rule.
    pub fn sizing_margin(&self) -> f64 {
        let pct = self.params.trade_amount_percent;
        if self.balance >= MARGIN_TIER_FRACTION * self.tactical_balance {
            pct * self.tactical_balance
        } else {
            self.balance * pct
        }
    }

    /// Leverage tier for a new position.
    pub fn sizing_leverage(&self, position: &PositionState) -> u32 {
        if self.total_balance(position) <= LEVERAGE_TIER_FRACTION * self.tactical_balance {
            self.params.low_leverage
        } else {
            self.params.high_leverage
        }
    }

    /// Open a position at `price`, debiting margin from both balances.
    pub fn open_position(
        &mut self,
        side: Side,
        price: f64,
        time: &str,
        position: &mut PositionState,
    ) -> Result<OpenResult, AccountError> {
        if let Some(open) = position.side() {
            return Err(AccountError::PositionAlreadyOpen(open));
        }
        if !price.is_finite() || price <= 0.0 {
            return Err(AccountError::InvalidPrice(price));
        }

        let margin = self.sizing_margin();
        if margin.is_nan() || margin <= 0.0 {
            return Err(AccountError::InsufficientBalance(margin));
        }
        let leverage = self.sizing_leverage(position);

        let position_value = margin * leverage as f64;
        let position_size = position_value / price;

        let margin_no_fee = self.balance_without_fee * self.params.trade_amount_percent;
        let position_value_no_fee = margin_no_fee * leverage as f64;
        let position_size_no_fee = position_value_no_fee / price;

        let balance_before_trade = self.balance;
        let balance_before_trade_no_fee = self.balance_without_fee;
        self.balance -= margin;
        self.balance_without_fee -= margin_no_fee;

        *position = PositionState::Open(OpenPosition {
            side,
            entry_price: price,
            open_time: time.to_string(),
            position_size,
            position_size_no_fee,
            margin,
            margin_no_fee,
            leverage,
            balance_before_trade,
            balance_before_trade_no_fee,
            order_id: None,
        });

        info!(
            side = %side,
            price,
            time,
            margin,
            leverage,
            balance = self.balance,
            "opened position"
        );

        Ok(OpenResult {
            side,
            entry_price: price,
            open_time: time.to_string(),
            margin,
            margin_no_fee,
            leverage,
            position_value,
            position_size,
            position_value_no_fee,
            position_size_no_fee,
            balance: self.balance,
            balance_without_fee: self.balance_without_fee,
            balance_before_trade,
            balance_before_trade_no_fee,
        })
    }

    /// Close the open `side` position at `price` and run every post-close rule:
    /// statistics, cooldown trigger, reserve replenishment, monthly settlement.
    pub fn close_position(
        &mut self,
        side: Side,
        price: f64,
        time: &str,
        position: &mut PositionState,
    ) -> Result<CloseResult, AccountError> {
        let open = match position.open_position() {
            None => return Err(AccountError::NoOpenPosition),
            Some(p) if p.side != side => {
                return Err(AccountError::SideMismatch {
                    requested: side,
                    actual: p.side,
                })
            }
            Some(p) => p.clone(),
        };
        if !price.is_finite() || price <= 0.0 {
            return Err(AccountError::InvalidPrice(price));
        }

        let direction = side.sign();
        let pnl = open.position_size * (price - open.entry_price) * direction;
        let pnl_no_fee = open.position_size_no_fee * (price - open.entry_price) * direction;
        let fee = (open.entry_price + price) * open.position_size * self.params.fee_rate;

        self.balance += open.margin + pnl - fee;
        self.balance_without_fee += open.margin_no_fee + pnl_no_fee;

        let profit = self.balance - open.balance_before_trade;
        let profit_percent = ratio_percent(profit, open.balance_before_trade);
        self.profit_percent_per_month = ratio_percent(self.balance, self.tactical_balance) - 100.0;
        let pnl_percent = ratio_percent(pnl, open.margin);

        self.stats
            .record_close(side, profit, profit_percent, self.balance, fee);

        let unleveraged_pnl_percent = pnl_percent / open.leverage.max(1) as f64;
        let cooldown_activated = unleveraged_pnl_percent >= self.params.big_pnl_threshold;
        if cooldown_activated {
            self.cooldown_until_index = self.params.cooldown_after_big_pnl;
            info!(
                side = %side,
                unleveraged_pnl_percent,
                cycles = self.cooldown_until_index,
                "cooldown activated after big pnl"
            );
        }

        let duration = match trade_duration(&open.open_time, time) {
            Ok(d) => Some(d),
            Err(e) => {
                warn!(error = %e, "could not compute trade duration");
                None
            }
        };

        let balance_after_trade = self.balance;
        let save_money_at_close = self.save_money;
        let replenished = self.replenish_from_reserve();
        let settlement = self.settle_month();

        *position = PositionState::Flat;

        info!(
            side = %side,
            price,
            time,
            pnl,
            fee,
            profit,
            profit_percent,
            balance_before = open.balance_before_trade,
            balance = self.balance,
            save_money = self.save_money,
            "closed position"
        );

        Ok(CloseResult {
            side,
            order_id: open.order_id,
            entry_price: open.entry_price,
            close_price: price,
            open_time: open.open_time,
            close_time: time.to_string(),
            margin: open.margin,
            leverage: open.leverage,
            position_size: open.position_size,
            pnl,
            pnl_no_fee,
            pnl_percent,
            fee,
            profit,
            profit_percent,
            profit_percent_per_month: self.profit_percent_per_month,
            balance_before_trade: open.balance_before_trade,
            balance_before_trade_no_fee: open.balance_before_trade_no_fee,
            balance_after_trade,
            balance: self.balance,
            balance_without_fee: self.balance_without_fee,
            save_money_at_close,
            duration,
            cooldown_activated,
            replenished,
            settlement,
        })
    }

    fn replenish_from_reserve(&mut self) -> Option<f64> {
        let transfer = RESERVE_TRANSFER_FRACTION * self.tactical_balance;
        if self.balance < RESERVE_TRIGGER_FRACTION * self.tactical_balance
            && self.save_money >= transfer
        {
            self.balance += transfer;
            self.save_money -= transfer;
            info!(
                amount = transfer,
                balance = self.balance,
                save_money = self.save_money,
                "replenished balance from reserve"
            );
            return Some(transfer);
        }
        None
    }

    fn settle_month(&mut self) -> Option<Settlement> {
        if !self.params.monthly_close_filter
            || self.profit_percent_per_month < self.params.monthly_profit_stop_percent
        {
            return None;
        }

        let previous_tactical = self.tactical_balance;
        self.tactical_balance += self.tactical_balance * self.params.monthly_compound_percent / 100.0;
        let moved_to_reserve = self.balance - self.tactical_balance;
        self.save_money += moved_to_reserve;
        self.balance = self.tactical_balance;
        self.cooldown_until_index = 0;
        self.trading_enabled = false;

        info!(
            monthly_profit_percent = self.profit_percent_per_month,
            tactical_balance = self.tactical_balance,
            save_money = self.save_money,
            "monthly target reached, trading paused until next month"
        );

        Some(Settlement {
            previous_tactical,
            new_tactical: self.tactical_balance,
            moved_to_reserve,
        })
    }

    /// Consume one cooldown cycle. Returns true if the cycle must be skipped.
    pub fn tick_cooldown(&mut self) -> bool {
        if self.cooldown_until_index > 0 {
            self.cooldown_until_index -= 1;
            true
        } else {
            false
        }
    }

    /// Archive the finished month's profit figure and re-enable trading.
    pub fn begin_new_month(&mut self, finished_year: i32, finished_month: u32) {
        self.monthly_history.push(MonthlyRecord {
            year: finished_year,
            month: finished_month,
            profit_percent: self.profit_percent_per_month,
        });
        info!(
            year = finished_year,
            month = finished_month,
            profit_percent = self.profit_percent_per_month,
            "new month, trading re-enabled"
        );
        self.profit_percent_per_month = 0.0;
        self.trading_enabled = true;
    }

    /// Restore an open position from its persisted order record.
    ///
    /// Balances come from the record when it carries them; older records
    /// fall back to debiting the margin from the current balance. Cumulative
    /// statistics are left untouched (they start from zero after a restart).
    pub fn rehydrate(
        &mut self,
        record: &OrderRecord,
        position: &mut PositionState,
    ) -> Result<(), AccountError> {
        if !record.is_open() {
            return Err(AccountError::OrderNotOpen(record.id));
        }
        if let Some(open) = position.side() {
            return Err(AccountError::PositionAlreadyOpen(open));
        }

        let margin_no_fee = record.margin_no_fee.unwrap_or(record.margin);
        self.balance = record.balance.unwrap_or(self.balance - record.margin);
        self.balance_without_fee = record
            .balance_without_fee
            .unwrap_or(self.balance_without_fee - margin_no_fee);

        *position = PositionState::Open(OpenPosition {
            side: record.side,
            entry_price: record.entry_price,
            open_time: record.open_time.clone(),
            position_size: record.position_size,
            position_size_no_fee: record.position_size_no_fee.unwrap_or(record.position_size),
            margin: record.margin,
            margin_no_fee,
            leverage: record.leverage,
            balance_before_trade: record
                .balance_before_trade
                .unwrap_or(self.balance + record.margin),
            balance_before_trade_no_fee: record
                .balance_before_trade_no_fee
                .unwrap_or(self.balance_without_fee + margin_no_fee),
            order_id: Some(record.id),
        });

        info!(
            order_id = record.id,
            side = %record.side,
            entry_price = record.entry_price,
            margin = record.margin,
            leverage = record.leverage,
            "rehydrated open position"
        );
        Ok(())
    }

    pub fn summary(&self) -> AccountSummary {
        let first = self.params.first_balance;
        AccountSummary {
            first_balance: first,
            final_balance: self.balance,
            balance_without_fee: self.balance_without_fee,
            tactical_balance: self.tactical_balance,
            save_money: self.save_money,
            total_profit: self.stats.total_profit(),
            net_profit_percent: ratio_percent(self.balance + self.save_money - first, first),
            total_profit_percent: self.stats.total_profit_percent,
            fees_paid: self.stats.fees_paid,
            closed_trades: self.stats.closed_trades,
            wins: self.stats.wins,
            losses: self.stats.losses,
            wins_long: self.stats.wins_long,
            wins_short: self.stats.wins_short,
            total_long: self.stats.total_long,
            total_short: self.stats.total_short,
            win_rate: self.stats.win_rate(),
            max_drawdown: self.stats.max_drawdown,
        }
    }
}

/// `100 * num / den`, or 0 when the denominator is zero.
fn ratio_percent(num: f64, den: f64) -> f64 {
    if den == 0.0 {
        0.0
    } else {
        num * 100.0 / den
    }
}
