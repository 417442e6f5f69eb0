use thiserror::Error;

use crate::domain::Side;

/// Precondition violations on the position state machine.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AccountError {
    #[error("cannot open: a {0} position is already open")]
    PositionAlreadyOpen(Side),

    #[error("cannot close: no position is open")]
    NoOpenPosition,

    #[error("cannot close {requested}: the open position is {actual}")]
    SideMismatch { requested: Side, actual: Side },

    #[error("reference price must be positive and finite, got {0}")]
    InvalidPrice(f64),

    #[error("computed margin {0} is not positive; balance is exhausted")]
    InsufficientBalance(f64),

    #[error("order {0} is not open and cannot be rehydrated")]
    OrderNotOpen(i64),
}
