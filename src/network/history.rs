//! Finished-game reporting.
//!
//! Builds the record for a terminal game and submits it to the external
//! history collaborator. Submission is fire-and-forget: players have
//! already been told the outcome, so a failure here is logged and
//! swallowed, never retried and never surfaced to the clients.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::game::{Board, GameResult};
use crate::network::session::ActiveGame;

/// Record of one finished game, as the history collaborator expects it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinishedGame {
    /// First mover's display name.
    pub first_player_name: String,
    /// Second mover's display name.
    pub second_player_name: String,
    /// Winner's display name, empty string on a draw.
    pub winner_name: String,
    /// When the board was created.
    pub started_at: DateTime<Utc>,
    /// When the terminal result was reached.
    pub ended_at: DateTime<Utc>,
    /// Count of the winning mark's occupied cells.
    pub winning_mark_count: u32,
}

impl FinishedGame {
    /// Assemble the record from a terminal board.
    pub fn from_game(game: &ActiveGame, board: &Board, result: GameResult) -> Self {
        let winner_name = match result {
            GameResult::FirstWon => game.first().name().to_string(),
            GameResult::SecondWon => game.second().name().to_string(),
            _ => String::new(),
        };

        Self {
            first_player_name: game.first().name().to_string(),
            second_player_name: game.second().name().to_string(),
            winner_name,
            started_at: board.started_at(),
            ended_at: board.ended_at().unwrap_or_else(Utc::now),
            winning_mark_count: board.winning_mark_count(),
        }
    }
}

/// Submission failure. Only ever logged by callers.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The history endpoint could not be reached or answered non-2xx.
    #[error("history submission failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The collaborator refused the record.
    #[error("history collaborator refused the record: {0}")]
    Refused(String),
}

/// Narrow interface to the history collaborator.
#[async_trait]
pub trait GameArchive: Send + Sync {
    /// Submit one finished-game record. No retry semantics.
    async fn submit(&self, record: FinishedGame) -> Result<(), ArchiveError>;
}

/// HTTP implementation posting to the history-persistence endpoint.
pub struct HttpGameArchive {
    client: reqwest::Client,
    save_game_url: String,
}

impl HttpGameArchive {
    /// Create an archive client for the given endpoint.
    pub fn new(save_game_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            save_game_url: save_game_url.into(),
        }
    }
}

#[async_trait]
impl GameArchive for HttpGameArchive {
    async fn submit(&self, record: FinishedGame) -> Result<(), ArchiveError> {
        self.client
            .post(&self.save_game_url)
            .json(&record)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
