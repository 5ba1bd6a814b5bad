use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Status string the backend uses for a successful response.
pub const STATUS_OK: &str = "200 OK";

/// Status string the backend uses when there is nothing to return
/// (for example no pending game for the table).
pub const STATUS_NOT_FOUND: &str = "400";

/// State of a single cell in the server-supplied revealed matrix.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Default)]
pub enum CellState {
    #[default]
    #[serde(rename = "HIDDEN")]
    Hidden,
    #[serde(rename = "SAFE")]
    Safe,
    #[serde(rename = "MINE")]
    Mine,
    #[serde(rename = "MINE_HIT")]
    MineHit,
}

/// Revealed matrix, one row per server row (server row 0 is the start row).
pub type RevealedMatrix = Vec<Vec<CellState>>;

/// Translate a row index between the server and client numbering.
///
/// The server counts rows from the start row upwards (0 = start), the client
/// counts from the top (rows - 1 = start). The mapping is its own inverse, so
/// the same function is used in both directions.
pub const fn flip_row(rows: usize, row: usize) -> usize {
    rows - 1 - row
}

/// Board configuration, written on the wire as `"ColsxRows"`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridShape {
    pub cols: usize,
    pub rows: usize,
}

impl GridShape {
    /// Shapes offered by the grid selector.
    pub const SUPPORTED: [GridShape; 5] = [
        GridShape::new(2, 3),
        GridShape::new(3, 6),
        GridShape::new(4, 9),
        GridShape::new(5, 12),
        GridShape::new(6, 15),
    ];

    pub const fn new(cols: usize, rows: usize) -> Self {
        Self { cols, rows }
    }

    pub fn is_supported(&self) -> bool {
        Self::SUPPORTED.contains(self)
    }

    /// Client row of the start (bottom) row.
    pub const fn bottom_row(&self) -> usize {
        self.rows - 1
    }

    pub const fn to_client_row(&self, server_row: usize) -> usize {
        flip_row(self.rows, server_row)
    }

    pub const fn to_server_row(&self, client_row: usize) -> usize {
        flip_row(self.rows, client_row)
    }

    /// Wire form of the shape, e.g. `"3x6"`.
    pub fn option(&self) -> String {
        self.to_string()
    }

    /// Payout multipliers for this shape, top row first.
    pub fn multipliers(&self) -> Vec<f64> {
        match (self.cols, self.rows) {
            (2, 3) => vec![7.85, 3.92, 1.96],
            (3, 6) => vec![11.17, 7.45, 4.97, 3.31, 2.21, 1.47],
            (4, 9) => vec![13.07, 9.80, 7.35, 5.51, 4.13, 3.10, 2.33, 1.74, 1.31],
            (5, 12) => vec![
                14.28, 11.42, 9.14, 7.31, 5.85, 4.68, 3.74, 2.99, 2.40, 1.92, 1.53, 1.23,
            ],
            (6, 15) => vec![
                15.11, 12.60, 10.50, 8.75, 7.29, 6.07, 5.06, 4.22, 3.52, 2.93, 2.44, 2.03, 1.70,
                1.41, 1.18,
            ],
            _ => {
                warn!(
                    "No multipliers found for {}, using fallback calculation",
                    self
                );
                (0..self.rows).map(|i| 1.2 + i as f64 * 0.3).collect()
            }
        }
    }

    /// Multipliers in climb order: entry `k - 1` pays out after `k` completed rows.
    pub fn row_rewards(&self) -> Vec<f64> {
        let mut rewards = self.multipliers();
        rewards.reverse();
        rewards
    }
}

impl Default for GridShape {
    fn default() -> Self {
        Self::new(3, 6)
    }
}

impl fmt::Display for GridShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.cols, self.rows)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseGridShapeError(pub String);

impl fmt::Display for ParseGridShapeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid grid option: {:?}", self.0)
    }
}

impl std::error::Error for ParseGridShapeError {}

impl FromStr for GridShape {
    type Err = ParseGridShapeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseGridShapeError(s.to_string());
        let (cols, rows) = s.trim().split_once(['x', 'X']).ok_or_else(err)?;
        let cols: usize = cols.trim().parse().map_err(|_| err())?;
        let rows: usize = rows.trim().parse().map_err(|_| err())?;
        if cols == 0 || rows == 0 {
            return Err(err());
        }
        Ok(Self { cols, rows })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CreateSessionResponse {
    pub token: String,
    pub balance: f64,
}
