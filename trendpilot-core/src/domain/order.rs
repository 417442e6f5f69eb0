//! Persisted order records: the restart-survival mirror of the position state.

use super::position::Side;
use serde::{Deserialize, Serialize};

/// Order lifecycle states as stored on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Open,
    Closed,
}

/// One order row. Written on open, updated in place on close.
///
/// Everything after `status` was added in schema v2 and is optional so that
/// older stores load unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub id: i64,
    pub symbol: String,
    pub side: Side,
    pub entry_price: f64,
    pub open_time: String,
    #[serde(default)]
    pub close_price: Option<f64>,
    #[serde(default)]
    pub close_time: Option<String>,
    pub position_size: f64,
    pub margin: f64,
    pub leverage: u32,
    #[serde(default)]
    pub profit: Option<f64>,
    #[serde(default)]
    pub profit_percent: Option<f64>,
    pub status: OrderStatus,

    #[serde(default)]
    pub balance: Option<f64>,
    #[serde(default)]
    pub balance_without_fee: Option<f64>,
    #[serde(default)]
    pub balance_before_trade: Option<f64>,
    #[serde(default)]
    pub balance_before_trade_no_fee: Option<f64>,
    #[serde(default)]
    pub margin_no_fee: Option<f64>,
    #[serde(default)]
    pub position_size_no_fee: Option<f64>,
    #[serde(default)]
    pub current_position: Option<Side>,
}

impl OrderRecord {
    pub fn is_open(&self) -> bool {
        self.status == OrderStatus::Open
    }
}

/// Fields written when a position opens (the id is assigned by the store).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOrder {
    pub symbol: String,
    pub side: Side,
    pub entry_price: f64,
    pub open_time: String,
    pub position_size: f64,
    pub position_size_no_fee: f64,
    pub margin: f64,
    pub margin_no_fee: f64,
    pub leverage: u32,
    pub balance: f64,
    pub balance_without_fee: f64,
    pub balance_before_trade: f64,
    pub balance_before_trade_no_fee: f64,
}

impl NewOrder {
    /// The full record this open produces once an id is assigned.
    pub fn into_record(self, id: i64) -> OrderRecord {
        OrderRecord {
            id,
            symbol: self.symbol,
            side: self.side,
            entry_price: self.entry_price,
            open_time: self.open_time,
            close_price: None,
            close_time: None,
            position_size: self.position_size,
            margin: self.margin,
            leverage: self.leverage,
            profit: None,
            profit_percent: None,
            status: OrderStatus::Open,
            balance: Some(self.balance),
            balance_without_fee: Some(self.balance_without_fee),
            balance_before_trade: Some(self.balance_before_trade),
            balance_before_trade_no_fee: Some(self.balance_before_trade_no_fee),
            margin_no_fee: Some(self.margin_no_fee),
            position_size_no_fee: Some(self.position_size_no_fee),
            current_position: Some(self.side),
        }
    }
}

/// Fields written when a position closes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderClose {
    pub close_price: f64,
    pub close_time: String,
    pub profit: f64,
    pub profit_percent: f64,
    pub balance: f64,
    pub balance_without_fee: f64,
}

impl OrderRecord {
    /// Apply a close update; the record becomes `closed` and flat.
    pub fn apply_close(&mut self, close: &OrderClose) {
        self.close_price = Some(close.close_price);
        self.close_time = Some(close.close_time.clone());
        self.profit = Some(close.profit);
        self.profit_percent = Some(close.profit_percent);
        self.balance = Some(close.balance);
        self.balance_without_fee = Some(close.balance_without_fee);
        self.status = OrderStatus::Closed;
        self.current_position = None;
    }
}
