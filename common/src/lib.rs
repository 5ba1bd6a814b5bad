//! Shared types and wire protocol for the tower mines client and server.
//!
//! [`models`] holds the board vocabulary (grid shapes, cell states, the
//! server/client row translation and the multiplier tables); [`protocol`]
//! holds the operation names and the JSON payloads exchanged over the socket.

pub mod models;
pub mod protocol;
