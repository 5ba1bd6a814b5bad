use std::sync::Arc;

use tower_common::models::{CellState, GridShape};
use tower_common::protocol::{Operation, RoundEndReason, SelectRequest, SelectResponse};
use tracing::{debug, info, warn};

use crate::board::{BoardAdapter, reveal_mines};
use crate::request::ensure_ok;
use crate::round::RoundCoordinator;
use crate::GameError;

/// What a resolved click did to the round.
#[derive(Debug, Clone, PartialEq)]
pub enum ClickOutcome {
    /// The round is lost.
    MineHit { row: usize, col: usize },
    /// Safe cell; the player continues from `next_row`.
    Advanced { next_row: usize, reward: f64 },
    /// Safe cell on the top row; the round is won.
    TopReached { reward: f64 },
}

/// Validates cell clicks and applies their outcome to the store and board.
pub struct CellInteraction {
    coordinator: Arc<RoundCoordinator>,
}

impl CellInteraction {
    pub fn new(coordinator: Arc<RoundCoordinator>) -> Self {
        Self { coordinator }
    }

    pub fn coordinator(&self) -> &Arc<RoundCoordinator> {
        &self.coordinator
    }

    /// Resolve a click on client row `row`, column `col`.
    pub async fn handle_cell_click(&self, row: usize, col: usize) -> Result<ClickOutcome, GameError> {
        let store = self.coordinator.store();
        if !store.game_started() {
            debug!("Ignoring click at ({}, {}): no round in progress", row, col);
            return Err(GameError::NotStarted);
        }

        let current = store.current_row();
        if row != current {
            warn!("Clicked row {} but the current row is {}", row, current);
            return Err(GameError::WrongRow {
                clicked: row,
                current,
            });
        }

        self.coordinator.begin_resolving()?;
        let board = self.coordinator.board();
        board.set_row_pressed(row, true);

        let grid = store.grid();
        let response = match self.select(grid, row, col).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Cell selection failed: {}", e);
                board.set_row_pressed(row, false);
                self.coordinator.end_resolving();
                return Err(e);
            }
        };

        if let Some(matrix) = response.revealed_matrix {
            store.set_revealed_matrix(matrix);
        }
        let reward = response.reward.unwrap_or_else(|| store.reward());
        store.set_reward(reward);

        if response.hit_mine.unwrap_or(false) {
            Ok(self.on_mine(grid, row, col).await)
        } else {
            Ok(self.on_safe(grid, row, col, reward).await)
        }
    }

    async fn select(&self, grid: GridShape, row: usize, col: usize) -> Result<SelectResponse, GameError> {
        let round_id = self
            .coordinator
            .store()
            .round_id()
            .ok_or(GameError::NotStarted)?;
        let request = SelectRequest {
            table_id: self.coordinator.store().table_id(),
            round_id,
            row: grid.to_server_row(row),
            col,
        };

        let response: SelectResponse = self
            .coordinator
            .requests()
            .request(Operation::Select, &request)
            .await?;
        ensure_ok(Operation::Select, response)
    }

    async fn on_mine(&self, grid: GridShape, row: usize, col: usize) -> ClickOutcome {
        info!("Mine hit at ({}, {})", row, col);
        let board = self.coordinator.board();
        board.play_blast_animation(row, col);
        board.add_mine_overlay(row, col);

        if let Err(e) = self.coordinator.end_round(RoundEndReason::MineHit).await {
            warn!("Round end after mine hit failed: {}", e);
        }

        let store = self.coordinator.store();
        reveal_mines(board.as_ref(), &store.revealed_matrix(), grid, 0, row);
        store.set_reward(0.0);
        self.coordinator.finish_round();
        ClickOutcome::MineHit { row, col }
    }

    async fn on_safe(&self, grid: GridShape, row: usize, col: usize, reward: f64) -> ClickOutcome {
        let board = self.coordinator.board();
        let store = self.coordinator.store();
        board.add_green_flag(row, col);
        self.settle_row(board.as_ref(), grid, row, col, &store.revealed_matrix());
        board.set_row_green_overlay(row, false);

        if row == 0 {
            info!("Top row reached, reward {}", reward);
            if let Err(e) = self.coordinator.end_round(RoundEndReason::LastRow).await {
                warn!("Round end after reaching the top failed: {}", e);
            }
            self.coordinator.finish_round();
            return ClickOutcome::TopReached { reward };
        }

        let next_row = row - 1;
        store.set_current_row(next_row);
        board.set_row_green_overlay(next_row, true);
        self.coordinator.end_resolving();
        debug!("Advanced to row {}, reward {}", next_row, reward);
        ClickOutcome::Advanced { next_row, reward }
    }

    /// Show the mines the player avoided on `row` and put unpicked cells back.
    fn settle_row(
        &self,
        board: &dyn BoardAdapter,
        grid: GridShape,
        row: usize,
        picked: usize,
        matrix: &[Vec<CellState>],
    ) {
        let Some(cells) = matrix.get(grid.to_server_row(row)) else {
            return;
        };
        for (col, cell) in cells.iter().enumerate() {
            match cell {
                CellState::Mine => board.add_bomb_overlay(row, col),
                CellState::Hidden if col != picked => board.revert_cell_overlay(row, col),
                _ => {}
            }
        }
    }
}
