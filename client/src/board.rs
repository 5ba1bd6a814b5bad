use std::sync::{Arc, Weak};

use tower_common::models::{CellState, GridShape, RevealedMatrix};
use tracing::{debug, info, warn};

use crate::state::{GameStore, Subscription};
use crate::UiGate;

/// Rendering primitives the round logic drives. Rows are client rows
/// (0 = top, `rows - 1` = start row).
pub trait BoardAdapter: Send + Sync {
    fn set_row_pressed(&self, row: usize, pressed: bool);
    /// Highlight the row the player may click next.
    fn set_row_green_overlay(&self, row: usize, visible: bool);
    fn add_green_flag(&self, row: usize, col: usize);
    /// The mine the player stepped on.
    fn add_mine_overlay(&self, row: usize, col: usize);
    /// A mine revealed without being hit.
    fn add_bomb_overlay(&self, row: usize, col: usize);
    fn revert_cell_overlay(&self, row: usize, col: usize);
    fn play_blast_animation(&self, row: usize, col: usize);
    fn reset_grid(&self);
    fn dimensions(&self) -> GridShape;
}

/// Board that draws nothing, for headless hosts.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullBoard {
    grid: GridShape,
}

impl NullBoard {
    pub fn new(grid: GridShape) -> Self {
        Self { grid }
    }
}

impl BoardAdapter for NullBoard {
    fn set_row_pressed(&self, _row: usize, _pressed: bool) {}
    fn set_row_green_overlay(&self, _row: usize, _visible: bool) {}
    fn add_green_flag(&self, _row: usize, _col: usize) {}
    fn add_mine_overlay(&self, _row: usize, _col: usize) {}
    fn add_bomb_overlay(&self, _row: usize, _col: usize) {}
    fn revert_cell_overlay(&self, _row: usize, _col: usize) {}
    fn play_blast_animation(&self, _row: usize, _col: usize) {}
    fn reset_grid(&self) {}

    fn dimensions(&self) -> GridShape {
        self.grid
    }
}

/// Cells of a client row, looked up through the server numbering.
fn matrix_row(matrix: &RevealedMatrix, grid: GridShape, client_row: usize) -> &[CellState] {
    matrix
        .get(grid.to_server_row(client_row))
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Bomb overlays for every unhit mine in client rows `top..=bottom`.
pub(crate) fn reveal_mines(
    board: &dyn BoardAdapter,
    matrix: &RevealedMatrix,
    grid: GridShape,
    top: usize,
    bottom: usize,
) {
    for row in top..=bottom.min(grid.bottom_row()) {
        for (col, cell) in matrix_row(matrix, grid, row).iter().enumerate() {
            if *cell == CellState::Mine {
                board.add_bomb_overlay(row, col);
            }
        }
    }
}

pub(crate) fn reveal_all_mines(board: &dyn BoardAdapter, matrix: &RevealedMatrix, grid: GridShape) {
    reveal_mines(board, matrix, grid, 0, grid.bottom_row());
}

/// Repaint the board from the store after a restore: completed rows pressed
/// with their flags and bombs, the current row highlighted.
pub fn paint_restored_round(board: &dyn BoardAdapter, store: &GameStore) {
    let session = store.snapshot();
    let grid = session.grid;
    if board.dimensions() != grid {
        warn!(
            "Board is {} but the restored round is {}",
            board.dimensions(),
            grid
        );
    }

    board.reset_grid();

    for row in (session.current_row + 1)..=grid.bottom_row() {
        board.set_row_pressed(row, true);
        for (col, cell) in matrix_row(&session.revealed_matrix, grid, row).iter().enumerate() {
            match cell {
                CellState::Safe => board.add_green_flag(row, col),
                CellState::Mine => board.add_bomb_overlay(row, col),
                CellState::MineHit => board.add_mine_overlay(row, col),
                CellState::Hidden => {}
            }
        }
    }

    if session.game_started {
        board.set_row_green_overlay(session.current_row, true);
    }
    debug!(
        "Restored board painted up to row {} of {}",
        session.current_row, grid
    );
}

/// Subscribe the painter that answers the pending-game-restore signal: it
/// repaints the board, locks the peripheral controls and then signals
/// restore-complete.
pub fn install_restore_painter(
    store: &Arc<GameStore>,
    board: Arc<dyn BoardAdapter>,
    gate: Arc<UiGate>,
) -> Subscription {
    let weak: Weak<GameStore> = Arc::downgrade(store);
    store.subscribe_pending_game_restore(move || {
        let Some(store) = weak.upgrade() else {
            return Ok(());
        };
        info!("Painting restored round");
        paint_restored_round(board.as_ref(), &store);
        gate.disable_ui_components();
        store.trigger_pending_game_restore_complete();
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{BoardCall, RecordingBoard};
    use std::sync::atomic::{AtomicBool, Ordering};
    use CellState::{Hidden, Mine, MineHit, Safe};

    fn restored_store() -> Arc<GameStore> {
        let store = Arc::new(GameStore::default());
        store.set_grid_dimensions(3, 6);
        // Two completed rows: server rows 0 and 1 are client rows 5 and 4.
        store.set_revealed_matrix(vec![
            vec![Safe, Mine, Hidden],
            vec![Mine, Hidden, Safe],
            vec![Hidden; 3],
            vec![Hidden; 3],
            vec![Hidden; 3],
            vec![Hidden; 3],
        ]);
        store.set_current_row(3);
        store.set_game_started(true);
        store
    }

    #[test]
    fn restored_round_marks_completed_rows_and_current_row() {
        let store = restored_store();
        let board = RecordingBoard::new(GridShape::new(3, 6));

        paint_restored_round(&board, &store);

        assert_eq!(
            board.calls(),
            vec![
                BoardCall::Reset,
                BoardCall::Pressed(4, true),
                BoardCall::Bomb(4, 0),
                BoardCall::Flag(4, 2),
                BoardCall::Pressed(5, true),
                BoardCall::Flag(5, 0),
                BoardCall::Bomb(5, 1),
                BoardCall::Green(3, true),
            ]
        );
    }

    #[test]
    fn reveal_mines_skips_hit_cell_and_rows_below() {
        let board = RecordingBoard::new(GridShape::new(2, 3));
        let matrix = vec![vec![Mine, Safe], vec![MineHit, Mine], vec![Safe, Mine]];

        reveal_mines(&board, &matrix, GridShape::new(2, 3), 0, 1);

        assert_eq!(board.calls(), vec![BoardCall::Bomb(0, 1), BoardCall::Bomb(1, 1)]);
    }

    #[test]
    fn painter_gates_controls_then_signals_complete() {
        let store = restored_store();
        let board = Arc::new(RecordingBoard::new(GridShape::new(3, 6)));
        let gate = Arc::new(UiGate::new());
        install_restore_painter(&store, board.clone(), gate.clone());

        let completed = Arc::new(AtomicBool::new(false));
        let (flag, gate_probe) = (completed.clone(), gate.clone());
        store.subscribe_pending_game_restore_complete(move || {
            assert!(gate_probe.is_locked());
            flag.store(true, Ordering::SeqCst);
            Ok(())
        });

        store.trigger_pending_game_restore();

        assert!(completed.load(Ordering::SeqCst));
        assert!(board.calls().contains(&BoardCall::Green(3, true)));
    }
}
