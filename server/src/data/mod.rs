use rand::Rng;
use tower_common::models::{CellState, GridShape, RevealedMatrix};

/// One round of the tower. Rows are server rows: 0 is the start row.
#[derive(Debug, Clone)]
pub struct Round {
    pub id: String,
    pub table_id: String,
    pub grid: GridShape,
    /// Stake, set once the bet is placed.
    pub bet: Option<f64>,
    /// Mine column per row, generated with the bet.
    pub mines: Vec<usize>,
    /// Column picked on each cleared row.
    pub picks: Vec<usize>,
    /// Cell where a mine was hit, if one was.
    pub hit: Option<(usize, usize)>,
}

/// One mine per row, uniformly placed.
pub fn generate_mines(grid: GridShape) -> Vec<usize> {
    let mut rng = rand::rng();
    (0..grid.rows)
        .map(|_| rng.random_range(0..grid.cols))
        .collect()
}

impl Round {
    pub fn new(id: String, table_id: String) -> Self {
        Self {
            id,
            table_id,
            grid: GridShape::default(),
            bet: None,
            mines: Vec::new(),
            picks: Vec::new(),
            hit: None,
        }
    }

    pub fn place_bet(&mut self, stake: f64, grid: GridShape, mines: Vec<usize>) {
        self.bet = Some(stake);
        self.grid = grid;
        self.mines = mines;
    }

    pub fn is_betted(&self) -> bool {
        self.bet.is_some()
    }

    /// Row the next pick must be made on.
    pub fn next_row(&self) -> usize {
        self.picks.len()
    }

    pub fn completed_rows(&self) -> usize {
        self.picks.len()
    }

    /// Still playable: bet placed, no mine hit, rows left to climb.
    pub fn is_open(&self) -> bool {
        self.is_betted() && self.hit.is_none() && self.picks.len() < self.grid.rows
    }

    /// Payout if the player collected now.
    pub fn reward(&self) -> f64 {
        match (self.bet, self.completed_rows()) {
            (_, 0) => 0.0,
            (None, _) => 0.0,
            (Some(_), _) if self.hit.is_some() => 0.0,
            (Some(bet), completed) => self
                .grid
                .row_rewards()
                .get(completed - 1)
                .map(|multiplier| bet * multiplier)
                .unwrap_or(0.0),
        }
    }

    /// Matrix as the player may see it. Cleared rows show their pick and the
    /// mine that was avoided; `reveal_all` also shows every other mine.
    pub fn revealed_matrix(&self, reveal_all: bool) -> RevealedMatrix {
        let mut matrix = vec![vec![CellState::Hidden; self.grid.cols]; self.grid.rows];

        for (row, pick) in self.picks.iter().enumerate() {
            matrix[row][*pick] = CellState::Safe;
            if let Some(mine) = self.mines.get(row) {
                matrix[row][*mine] = CellState::Mine;
            }
        }

        if reveal_all {
            for (row, mine) in self.mines.iter().enumerate() {
                matrix[row][*mine] = CellState::Mine;
            }
        }

        if let Some((row, col)) = self.hit {
            matrix[row][col] = CellState::MineHit;
        }
        matrix
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn betted_round() -> Round {
        let mut round = Round::new("r".into(), "T".into());
        round.place_bet(10.0, GridShape::new(3, 6), vec![0, 1, 2, 0, 1, 2]);
        round
    }

    #[test]
    fn every_row_gets_exactly_one_mine() {
        for grid in GridShape::SUPPORTED {
            let mines = generate_mines(grid);
            assert_eq!(mines.len(), grid.rows);
            assert!(mines.iter().all(|col| *col < grid.cols));
        }
    }

    #[test]
    fn reward_follows_row_rewards() {
        let mut round = betted_round();
        assert_eq!(round.reward(), 0.0);

        round.picks = vec![1, 2];
        let expected = 10.0 * GridShape::new(3, 6).row_rewards()[1];
        assert!((round.reward() - expected).abs() < 1e-9);

        round.hit = Some((2, 2));
        assert_eq!(round.reward(), 0.0);
    }

    #[test]
    fn matrix_shows_picks_and_avoided_mines() {
        let mut round = betted_round();
        round.picks = vec![1];

        let matrix = round.revealed_matrix(false);
        assert_eq!(
            matrix[0],
            vec![CellState::Mine, CellState::Safe, CellState::Hidden]
        );
        assert!(matrix[1].iter().all(|cell| *cell == CellState::Hidden));

        round.hit = Some((1, 1));
        let matrix = round.revealed_matrix(true);
        assert_eq!(matrix[1][1], CellState::MineHit);
        assert_eq!(matrix[5][2], CellState::Mine);
    }
}
