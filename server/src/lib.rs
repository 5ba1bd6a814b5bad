//! Reference backend for the tower mines client.
//!
//! Players open a session over HTTP and then play over a websocket that
//! speaks the `{operation, requestId, data}` protocol from `tower-common`.
//! State lives in memory only.

pub mod cleanup;
pub mod cors;
pub mod data;
pub mod logic;
pub mod rate_limit;
pub mod routes;
