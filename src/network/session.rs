//! Players, active games and the matchmaker.
//!
//! All shared mutable state of the server lives here: the single waiting
//! slot and the registry of active games. Both are owned by the
//! `Matchmaker`, which the lifecycle manager constructs and injects into
//! the router and the heartbeat monitor.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use tracing::info;

use crate::game::Board;
use crate::network::connection::{Connection, ConnectionId};
use crate::network::protocol::ServerMessage;

/// A connected, authenticated participant.
#[derive(Debug)]
pub struct Player {
    conn: Connection,
    name: String,
    identity: String,
    last_heartbeat_ms: AtomicI64,
}

impl Player {
    /// Wrap an accepted connection. The heartbeat clock starts now.
    pub fn new(conn: Connection, name: impl Into<String>, identity: impl Into<String>) -> Self {
        Self {
            conn,
            name: name.into(),
            identity: identity.into(),
            last_heartbeat_ms: AtomicI64::new(Utc::now().timestamp_millis()),
        }
    }

    /// The player's connection handle.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Display name shown to the opponent and in the finished-game record.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Opaque identity string used for duplicate-play checks.
    /// Compared by exact string match, no normalization.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Record a heartbeat arrival.
    pub fn touch_heartbeat(&self) {
        self.last_heartbeat_ms
            .store(Utc::now().timestamp_millis(), Ordering::Release);
    }

    /// Epoch milliseconds of the last heartbeat (or of acceptance).
    pub fn last_heartbeat_ms(&self) -> i64 {
        self.last_heartbeat_ms.load(Ordering::Acquire)
    }
}

/// An unordered-but-fixed pair of players plus their board. The first
/// player is the first mover and plays X.
#[derive(Debug)]
pub struct ActiveGame {
    first: Arc<Player>,
    second: Arc<Player>,
    board: Mutex<Board>,
}

impl ActiveGame {
    fn new(first: Arc<Player>, second: Arc<Player>) -> Self {
        Self {
            first,
            second,
            board: Mutex::new(Board::new()),
        }
    }

    /// The first mover.
    pub fn first(&self) -> &Arc<Player> {
        &self.first
    }

    /// The second mover.
    pub fn second(&self) -> &Arc<Player> {
        &self.second
    }

    /// Both participants.
    pub fn players(&self) -> [&Arc<Player>; 2] {
        [&self.first, &self.second]
    }

    /// Whether either side uses this connection.
    pub fn involves(&self, conn_id: ConnectionId) -> bool {
        self.first.conn().id() == conn_id || self.second.conn().id() == conn_id
    }

    /// The player on this connection, if it belongs to the game.
    pub fn player_by_conn(&self, conn_id: ConnectionId) -> Option<&Arc<Player>> {
        if self.first.conn().id() == conn_id {
            Some(&self.first)
        } else if self.second.conn().id() == conn_id {
            Some(&self.second)
        } else {
            None
        }
    }

    /// The other side of this connection, if it belongs to the game.
    pub fn opponent_of(&self, conn_id: ConnectionId) -> Option<&Arc<Player>> {
        if self.first.conn().id() == conn_id {
            Some(&self.second)
        } else if self.second.conn().id() == conn_id {
            Some(&self.first)
        } else {
            None
        }
    }

    /// The shared board. Mutated only through validated moves.
    pub fn board(&self) -> &Mutex<Board> {
        &self.board
    }
}

/// Pairs incoming players into games and keeps the registry of active
/// games. Appends and removals come from connection-event tasks while
/// the heartbeat sweep scans concurrently; a brief staleness window in
/// scans is fine because the connect-time checks re-read everything
/// under the locks.
pub struct Matchmaker {
    waiting: RwLock<Option<Arc<Player>>>,
    games: RwLock<Vec<Arc<ActiveGame>>>,
}

impl Matchmaker {
    /// Create an empty matchmaker.
    pub fn new() -> Self {
        Self {
            waiting: RwLock::new(None),
            games: RwLock::new(Vec::new()),
        }
    }

    /// Pair `player` with the waiting occupant, or park them in the
    /// waiting slot. On pairing, both sides get a `GameStarted` frame
    /// identifying their ordinal; the waiting player moves first.
    pub async fn pair_or_wait(&self, player: Arc<Player>) -> Option<Arc<ActiveGame>> {
        let paired = {
            let mut waiting = self.waiting.write().await;
            match waiting.take() {
                Some(lonely) => {
                    let game = Arc::new(ActiveGame::new(lonely, player));
                    self.games.write().await.push(game.clone());
                    Some(game)
                }
                None => {
                    *waiting = Some(player);
                    None
                }
            }
        };

        if let Some(game) = &paired {
            info!(
                first = game.first().name(),
                second = game.second().name(),
                "game started"
            );
            game.first()
                .conn()
                .send(ServerMessage::GameStarted("1st player".to_string()))
                .await;
            game.second()
                .conn()
                .send(ServerMessage::GameStarted("2nd player".to_string()))
                .await;
        }

        paired
    }

    /// Number of active games.
    pub async fn game_count(&self) -> usize {
        self.games.read().await.len()
    }

    /// Whether this identity occupies the waiting slot.
    pub async fn is_identity_waiting(&self, identity: &str) -> bool {
        self.waiting
            .read()
            .await
            .as_ref()
            .is_some_and(|p| p.identity() == identity)
    }

    /// Whether this identity belongs to any active game.
    pub async fn is_identity_playing(&self, identity: &str) -> bool {
        self.games.read().await.iter().any(|game| {
            game.players()
                .iter()
                .any(|p| p.identity() == identity)
        })
    }

    /// Find the game a connection belongs to.
    pub async fn find_game_by_conn(&self, conn_id: ConnectionId) -> Option<Arc<ActiveGame>> {
        self.games
            .read()
            .await
            .iter()
            .find(|game| game.involves(conn_id))
            .cloned()
    }

    /// Find a live player (waiting or playing) by connection.
    pub async fn find_player_by_conn(&self, conn_id: ConnectionId) -> Option<Arc<Player>> {
        if let Some(waiting) = self.waiting.read().await.as_ref() {
            if waiting.conn().id() == conn_id {
                return Some(waiting.clone());
            }
        }
        self.find_game_by_conn(conn_id)
            .await
            .and_then(|game| game.player_by_conn(conn_id).cloned())
    }

    /// Clear the waiting slot if this connection occupies it.
    /// Returns the evicted player; `None` if the slot held someone else
    /// or nobody.
    pub async fn clear_waiting_by_conn(&self, conn_id: ConnectionId) -> Option<Arc<Player>> {
        let mut waiting = self.waiting.write().await;
        if waiting
            .as_ref()
            .is_some_and(|p| p.conn().id() == conn_id)
        {
            waiting.take()
        } else {
            None
        }
    }

    /// Remove the game this connection belongs to. Idempotent: returns
    /// `None` when the game was already removed.
    pub async fn remove_game_by_conn(&self, conn_id: ConnectionId) -> Option<Arc<ActiveGame>> {
        let mut games = self.games.write().await;
        let index = games.iter().position(|game| game.involves(conn_id))?;
        Some(games.swap_remove(index))
    }

    /// Snapshot of every live player: the waiting occupant (if any) plus
    /// both sides of every active game.
    pub async fn live_players(&self) -> Vec<Arc<Player>> {
        let mut players = Vec::new();
        if let Some(waiting) = self.waiting.read().await.as_ref() {
            players.push(waiting.clone());
        }
        for game in self.games.read().await.iter() {
            players.push(game.first().clone());
            players.push(game.second().clone());
        }
        players
    }
}

impl Default for Matchmaker {
    fn default() -> Self {
        Self::new()
    }
}
