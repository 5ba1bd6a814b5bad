use thiserror::Error;
use tower_common::models::GridShape;
use tower_common::protocol::Operation;

/// Failures surfaced by the round coordinator and the cell click handler.
///
/// Every variant is resolved at the boundary that produced it; callers get a
/// plain `Err` and are expected to re-enable whatever UI they locked.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GameError {
    #[error("no round is active")]
    NotStarted,

    #[error("row {clicked} is not the active row {current}")]
    WrongRow { clicked: usize, current: usize },

    #[error("stake {stake} exceeds balance {balance}")]
    InsufficientBalance { stake: f64, balance: f64 },

    #[error("another round operation is already in flight")]
    Busy,

    #[error("no row has been cleared yet, nothing to collect")]
    NothingToCollect,

    #[error("grid {0} is not supported")]
    UnsupportedGrid(GridShape),

    #[error("socket is not connected")]
    Disconnected,

    #[error("{operation} request timed out")]
    Timeout { operation: Operation },

    #[error("{operation} rejected by server with status {status:?}")]
    ServerRejected { operation: Operation, status: String },

    #[error("invalid {operation} response: {reason}")]
    InvalidResponse { operation: Operation, reason: String },

    #[error("failed to send frame: {0}")]
    Send(String),
}
