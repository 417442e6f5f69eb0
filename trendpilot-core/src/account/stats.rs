//! Cumulative trade statistics and the end-of-run summary.

use serde::{Deserialize, Serialize};

use crate::domain::Side;

/// Counters and curves updated once per closed trade.
///
/// None of this survives a restart: a rehydrated account starts from zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TradeStats {
    pub closed_trades: u32,
    pub wins: u32,
    pub losses: u32,
    pub wins_long: u32,
    pub wins_short: u32,
    pub total_long: u32,
    pub total_short: u32,
    /// Post-close balance after every trade.
    pub equity_curve: Vec<f64>,
    /// Most negative peak-to-trough percentage seen so far (<= 0).
    pub max_drawdown: f64,
    pub profits: Vec<f64>,
    /// Sum of per-trade profit percents.
    pub total_profit_percent: f64,
    pub fees_paid: f64,
}

impl TradeStats {
    pub(crate) fn record_close(
        &mut self,
        side: Side,
        profit: f64,
        profit_percent: f64,
        balance: f64,
        fee: f64,
    ) {
        self.fees_paid += fee;
        self.profits.push(profit);
        self.total_profit_percent += profit_percent;
        self.closed_trades += 1;

        self.equity_curve.push(balance);
        let peak = self.peak_equity();
        if peak != 0.0 {
            let drawdown = (balance - peak) / peak * 100.0;
            self.max_drawdown = self.max_drawdown.min(drawdown);
        }

        let win = profit_percent > 0.0;
        if win {
            self.wins += 1;
        } else {
            self.losses += 1;
        }
        match side {
            Side::Long => {
                self.total_long += 1;
                if win {
                    self.wins_long += 1;
                }
            }
            Side::Short => {
                self.total_short += 1;
                if win {
                    self.wins_short += 1;
                }
            }
        }
    }

    pub fn peak_equity(&self) -> f64 {
        self.equity_curve
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max)
    }

    pub fn total_profit(&self) -> f64 {
        self.profits.iter().sum()
    }

    /// Win rate in percent; 0 when nothing has closed.
    pub fn win_rate(&self) -> f64 {
        if self.closed_trades == 0 {
            return 0.0;
        }
        self.wins as f64 / self.closed_trades as f64 * 100.0
    }
}

/// One archived month of trading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyRecord {
    pub year: i32,
    pub month: u32,
    pub profit_percent: f64,
}

/// End-of-run snapshot of the account, for the CLI printout and exports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSummary {
    pub first_balance: f64,
    pub final_balance: f64,
    pub balance_without_fee: f64,
    pub tactical_balance: f64,
    pub save_money: f64,
    pub total_profit: f64,
    /// Change of balance plus reserve against the first balance, in percent.
    pub net_profit_percent: f64,
    pub total_profit_percent: f64,
    pub fees_paid: f64,
    pub closed_trades: u32,
    pub wins: u32,
    pub losses: u32,
    pub wins_long: u32,
    pub wins_short: u32,
    pub total_long: u32,
    pub total_short: u32,
    pub win_rate: f64,
    pub max_drawdown: f64,
}
