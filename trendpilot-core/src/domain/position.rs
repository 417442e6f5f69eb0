//! Position state: flat or exactly one open leveraged position.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of an open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// +1 for long, -1 for short.
    pub fn sign(self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::Long => "long",
            Side::Short => "short",
        }
    }

    /// Parse the lowercase persisted form (`"long"` / `"short"`).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "long" => Some(Side::Long),
            "short" => Some(Side::Short),
            _ => None,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => write!(f, "LONG"),
            Side::Short => write!(f, "SHORT"),
        }
    }
}

/// Per-trade scratch values, scoped to the life of one open position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenPosition {
    pub side: Side,
    pub entry_price: f64,
    /// Literal timestamp string (`YYYY-MM-DD HH:MM:SS.ffffff`).
    pub open_time: String,
    pub position_size: f64,
    pub position_size_no_fee: f64,
    pub margin: f64,
    pub margin_no_fee: f64,
    pub leverage: u32,
    pub balance_before_trade: f64,
    pub balance_before_trade_no_fee: f64,
    /// Persisted order id, once the open has been recorded.
    pub order_id: Option<i64>,
}

impl OpenPosition {
    /// Notional value at entry.
    pub fn position_value(&self) -> f64 {
        self.margin * self.leverage as f64
    }

    /// Unrealized PnL at `price`, fee excluded.
    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.side.sign() * self.position_size * (price - self.entry_price)
    }
}

/// The position state machine: `Flat` or one `Open` position.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum PositionState {
    #[default]
    Flat,
    Open(OpenPosition),
}

impl PositionState {
    pub fn is_flat(&self) -> bool {
        matches!(self, PositionState::Flat)
    }

    pub fn side(&self) -> Option<Side> {
        match self {
            PositionState::Flat => None,
            PositionState::Open(p) => Some(p.side),
        }
    }

    pub fn is_side(&self, side: Side) -> bool {
        self.side() == Some(side)
    }

    pub fn open_position(&self) -> Option<&OpenPosition> {
        match self {
            PositionState::Flat => None,
            PositionState::Open(p) => Some(p),
        }
    }

    pub fn open_position_mut(&mut self) -> Option<&mut OpenPosition> {
        match self {
            PositionState::Flat => None,
            PositionState::Open(p) => Some(p),
        }
    }

    /// Margin locked in the open position (zero when flat).
    pub fn locked_margin(&self) -> f64 {
        self.open_position().map_or(0.0, |p| p.margin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn long_position() -> OpenPosition {
        OpenPosition {
            side: Side::Long,
            entry_price: 100.0,
            open_time: "2024-01-05 10:15:00.000000".into(),
            position_size: 2.5,
            position_size_no_fee: 2.5,
            margin: 50.0,
            margin_no_fee: 50.0,
            leverage: 5,
            balance_before_trade: 1000.0,
            balance_before_trade_no_fee: 1000.0,
            order_id: None,
        }
    }

    #[test]
    fn side_parse_and_sign() {
        assert_eq!(Side::parse("LONG"), Some(Side::Long));
        assert_eq!(Side::parse(" short "), Some(Side::Short));
        assert_eq!(Side::parse("flat"), None);
        assert_eq!(Side::Long.sign(), 1.0);
        assert_eq!(Side::Short.sign(), -1.0);
    }

    #[test]
    fn flat_by_default() {
        let state = PositionState::default();
        assert!(state.is_flat());
        assert_eq!(state.side(), None);
        assert_eq!(state.locked_margin(), 0.0);
    }

    #[test]
    fn open_reports_side_and_margin() {
        let state = PositionState::Open(long_position());
        assert!(state.is_side(Side::Long));
        assert!(!state.is_side(Side::Short));
        assert_eq!(state.locked_margin(), 50.0);
    }

    #[test]
    fn unrealized_pnl_is_directional() {
        let mut pos = long_position();
        assert_eq!(pos.unrealized_pnl(104.0), 10.0);
        pos.side = Side::Short;
        assert_eq!(pos.unrealized_pnl(104.0), -10.0);
        assert_eq!(pos.position_value(), 250.0);
    }
}
