//! Domain types for trendpilot

pub mod candle;
pub mod order;
pub mod position;

pub use candle::{Candle, PriceSource};
pub use order::{NewOrder, OrderClose, OrderRecord, OrderStatus};
pub use position::{OpenPosition, PositionState, Side};

/// Symbol type alias
pub type Symbol = String;
