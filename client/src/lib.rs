//! Tower Mines Client Library
//!
//! Client-side round synchronization for the tower climb minesweeper game: a
//! grid of rows is climbed by picking a safe cell in each row, with the payout
//! multiplier growing after every row and a collect-or-continue decision at
//! each step.
//!
//! The crate reconciles the authoritative server round (balance, round id,
//! grid shape, revealed cells, current row) with the local board, arbitrates
//! start / click / collect actions under network latency, and restores a round
//! left open by a previous session.
//!
//! ## Usage
//!
//! ### High-Level Interface (Recommended)
//!
//! [`TowerGame`] creates a player session, connects the socket and wires the
//! store, the round coordinator and the cell click handler together:
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tower_client::{ClientConfig, NullBoard, NullShell, TowerGame, UiGate};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let game = TowerGame::connect(
//!         ClientConfig::from_env(),
//!         Arc::new(NullBoard::default()),
//!         Arc::new(UiGate::new()),
//!         Arc::new(NullShell),
//!     )
//!     .await?;
//!
//!     game.boot().await?;
//!     game.start().await?;
//!
//!     let row = game.store().current_row();
//!     let outcome = game.click(row, 0).await?;
//!     println!("{outcome:?}");
//!
//!     game.disconnect().await;
//!     Ok(())
//! }
//! ```
//!
//! ### Low-Level Interface
//!
//! The [`GameStore`], [`RoundCoordinator`] and [`CellInteraction`] types can be
//! assembled over any [`Transport`] implementation, which is how the unit tests
//! drive the round logic without a server.

mod board;
mod boot;
mod cell;
mod client;
mod config;
mod error;
mod game;
mod gate;
mod request;
mod round;
mod state;
mod transport;

#[cfg(test)]
mod testkit;

pub use board::{BoardAdapter, NullBoard, install_restore_painter, paint_restored_round};
pub use boot::BootOutcome;
pub use cell::{CellInteraction, ClickOutcome};
pub use client::TowerClient;
pub use config::{ClientConfig, MissingExistingGameFlag};
pub use error::GameError;
pub use game::{GameEvent, TowerGame};
pub use gate::{AppShell, Gateable, NullShell, UiGate};
pub use request::RequestClient;
pub use round::{PendingCheck, PendingGame, RoundCoordinator, RoundPhase};
pub use state::{GameSession, GameStore, ListenerResult, StoreEvent, Subscription};
pub use transport::{Handler, HandlerRegistry, SocketTransport, Transport};

// Re-export common types for convenience
pub use tower_common::{models::*, protocol::*};

pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;
