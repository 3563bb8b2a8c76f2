//! Board state and result detection.
//!
//! Pure 3x3 game logic with no I/O. The board is mutated only through
//! validated moves and a terminal result never reverts to ongoing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The two playable symbols. The first mover plays `X`, the second `O`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mark {
    /// First player's symbol.
    X,
    /// Second player's symbol.
    O,
}

impl Mark {
    /// Parse a wire symbol ("X" or "O"). Anything else is an invalid move.
    pub fn from_symbol(symbol: &str) -> Result<Self, InvalidMove> {
        match symbol {
            "X" => Ok(Mark::X),
            "O" => Ok(Mark::O),
            other => Err(InvalidMove::UnknownMark(other.to_string())),
        }
    }

    /// Wire representation of the symbol.
    pub fn as_symbol(&self) -> &'static str {
        match self {
            Mark::X => "X",
            Mark::O => "O",
        }
    }
}

/// Outcome of a board evaluation. Transitions are one-directional:
/// once terminal, `evaluate` keeps returning the same result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameResult {
    /// Game still in progress.
    Ongoing,
    /// First mover (X) completed a triple.
    FirstWon,
    /// Second mover (O) completed a triple.
    SecondWon,
    /// All nine cells filled with no triple.
    Draw,
}

impl GameResult {
    /// Whether the game has ended.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, GameResult::Ongoing)
    }

    /// Human-readable message sent to both players when the game ends.
    pub fn message(&self) -> &'static str {
        match self {
            GameResult::Ongoing => "",
            GameResult::FirstWon => "1st player won",
            GameResult::SecondWon => "2nd player won",
            GameResult::Draw => "Draw",
        }
    }
}

/// Rejected move. Expected control flow: logged, state unchanged,
/// connection unaffected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidMove {
    /// Cell index outside 0..=8.
    #[error("cell index must be between 0 and 8, got {0}")]
    CellOutOfRange(u32),

    /// Symbol is neither "X" nor "O".
    #[error("unknown mark {0:?}, accepted: X or O")]
    UnknownMark(String),

    /// Cell was already written; cells are never overwritten.
    #[error("cell {cell} already marked by {occupied_by:?}")]
    CellOccupied {
        /// The contested cell index.
        cell: u32,
        /// The mark already present.
        occupied_by: Mark,
    },
}

/// The 8 canonical winning triples: 3 rows, 3 columns, 2 diagonals.
const WINNING_TRIPLES: [[usize; 3]; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

/// A 3x3 board plus the bookkeeping needed for the finished-game record.
#[derive(Debug, Clone)]
pub struct Board {
    cells: [Option<Mark>; 9],
    result: GameResult,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    winning_mark_count: u32,
}

impl Board {
    /// Create an empty board, recording the start timestamp.
    pub fn new() -> Self {
        Self {
            cells: [None; 9],
            result: GameResult::Ongoing,
            started_at: Utc::now(),
            ended_at: None,
            winning_mark_count: 0,
        }
    }

    /// Write `mark` into `cell`. Fails without mutating on an index
    /// outside 0..=8 or an already-occupied cell.
    pub fn apply(&mut self, cell: u32, mark: Mark) -> Result<(), InvalidMove> {
        if cell > 8 {
            return Err(InvalidMove::CellOutOfRange(cell));
        }
        let slot = &mut self.cells[cell as usize];
        if let Some(occupied_by) = *slot {
            return Err(InvalidMove::CellOccupied { cell, occupied_by });
        }
        *slot = Some(mark);
        Ok(())
    }

    /// Determine the current result. Must be called after every
    /// successful `apply`. On reaching a terminal result the end
    /// timestamp and the winner's mark count are recorded.
    pub fn evaluate(&mut self) -> GameResult {
        if self.result.is_terminal() {
            return self.result;
        }

        for [a, b, c] in WINNING_TRIPLES {
            if let (Some(va), Some(vb), Some(vc)) = (self.cells[a], self.cells[b], self.cells[c]) {
                if va == vb && va == vc {
                    self.result = match va {
                        Mark::X => GameResult::FirstWon,
                        Mark::O => GameResult::SecondWon,
                    };
                    self.winning_mark_count = self.count_of(va);
                    self.ended_at = Some(Utc::now());
                    return self.result;
                }
            }
        }

        if self.cells.iter().all(|cell| cell.is_some()) {
            self.result = GameResult::Draw;
            self.ended_at = Some(Utc::now());
        }

        self.result
    }

    fn count_of(&self, mark: Mark) -> u32 {
        self.cells.iter().filter(|cell| **cell == Some(mark)).count() as u32
    }

    /// The mark in `cell`, if any. Out-of-range indices read as empty.
    pub fn mark_at(&self, cell: u32) -> Option<Mark> {
        self.cells.get(cell as usize).copied().flatten()
    }

    /// When the board was created.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// When the terminal result was reached, if it has been.
    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    /// Count of the winning mark's occupied cells (0 while ongoing or drawn).
    pub fn winning_mark_count(&self) -> u32 {
        self.winning_mark_count
    }
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}
