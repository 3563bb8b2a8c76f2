//! Game Logic Module
//!
//! Pure board state and result detection. No I/O, no shared state.
//!
//! - `board`: 3x3 board, move validation, win/draw detection

pub mod board;

pub use board::{Board, GameResult, InvalidMove, Mark};
