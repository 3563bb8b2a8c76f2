//! Message Router
//!
//! Parses inbound frames and dispatches them to handlers. Unknown kinds
//! are logged and dropped. A failing handler is caught and logged at the
//! dispatch boundary; the connection stays open and board state is
//! untouched by the failed operation.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::game::{InvalidMove, Mark};
use crate::network::connection::{Connection, ConnectionId};
use crate::network::history::{FinishedGame, GameArchive};
use crate::network::protocol::{ClientMessage, MoveData, ServerMessage};
use crate::network::session::Matchmaker;

/// Why a handler dropped a frame. Invalid moves are expected control
/// flow; the lookup variants signal an internal invariant violation.
#[derive(Debug, Error)]
pub enum RouteError {
    /// Move rejected by board validation.
    #[error(transparent)]
    InvalidMove(#[from] InvalidMove),

    /// No live player registered for this connection.
    #[error("no player found for connection {0}")]
    PlayerNotFound(ConnectionId),

    /// No active game registered for this connection.
    #[error("no game found for connection {0}")]
    GameNotFound(ConnectionId),

    /// The game exists but this connection is on neither side.
    #[error("no opponent found for connection {0}")]
    OpponentNotFound(ConnectionId),
}

impl RouteError {
    fn is_expected(&self) -> bool {
        matches!(self, RouteError::InvalidMove(_))
    }
}

/// Routes inbound frames between paired peers.
pub struct MessageRouter {
    matchmaker: Arc<Matchmaker>,
    archive: Arc<dyn GameArchive>,
}

impl MessageRouter {
    /// Create a router over the injected registry and history collaborator.
    pub fn new(matchmaker: Arc<Matchmaker>, archive: Arc<dyn GameArchive>) -> Self {
        Self { matchmaker, archive }
    }

    /// Parse and dispatch one inbound text frame. Never closes the
    /// connection; every failure path degrades to "drop and log".
    pub async fn route_frame(&self, conn: &Connection, raw: &str) {
        let msg = match ClientMessage::from_json(raw) {
            Ok(msg) => msg,
            Err(err) => {
                warn!(conn = %conn.id(), %err, "unknown or malformed frame dropped");
                return;
            }
        };

        if let Err(err) = self.dispatch(conn, msg).await {
            if err.is_expected() {
                warn!(conn = %conn.id(), %err, "frame rejected");
            } else {
                error!(conn = %conn.id(), %err, "frame dropped");
            }
        }
    }

    async fn dispatch(&self, conn: &Connection, msg: ClientMessage) -> Result<(), RouteError> {
        match msg {
            ClientMessage::PlayerMessage(payload) => self.relay_player_message(conn, payload).await,
            ClientMessage::GameUpdate(mv) => self.relay_game_update(conn, mv).await,
            ClientMessage::Heartbeat => self.handle_heartbeat(conn).await,
            ClientMessage::MoveAck(mv) => self.confirm_move(conn, mv).await,
        }
    }

    /// Relay an opaque payload to the opponent.
    async fn relay_player_message(
        &self,
        conn: &Connection,
        payload: serde_json::Value,
    ) -> Result<(), RouteError> {
        let opponent = self.opponent_of(conn).await?;
        opponent
            .conn()
            .send(ServerMessage::OpponentMessage(payload))
            .await;
        Ok(())
    }

    /// Relay a provisional move to the opponent. The board is only
    /// mutated once the opponent acknowledges.
    async fn relay_game_update(&self, conn: &Connection, mv: MoveData) -> Result<(), RouteError> {
        let opponent = self.opponent_of(conn).await?;
        opponent.conn().send(ServerMessage::GameUpdated(mv)).await;
        Ok(())
    }

    /// Record the liveness signal and echo the server clock back.
    async fn handle_heartbeat(&self, conn: &Connection) -> Result<(), RouteError> {
        let player = self
            .matchmaker
            .find_player_by_conn(conn.id())
            .await
            .ok_or(RouteError::PlayerNotFound(conn.id()))?;

        player.touch_heartbeat();
        conn.send(ServerMessage::HeartbeatAck(Utc::now().timestamp_millis()))
            .await;
        Ok(())
    }

    /// The opponent confirmed receiving a relayed update: acknowledge to
    /// the original mover, apply the move authoritatively, evaluate, and
    /// on a terminal result notify both players before reporting.
    async fn confirm_move(&self, conn: &Connection, mv: MoveData) -> Result<(), RouteError> {
        let game = self
            .matchmaker
            .find_game_by_conn(conn.id())
            .await
            .ok_or(RouteError::GameNotFound(conn.id()))?;
        let opponent = game
            .opponent_of(conn.id())
            .ok_or(RouteError::OpponentNotFound(conn.id()))?;

        opponent
            .conn()
            .send(ServerMessage::OpponentReceivedUpdateAck("Ok".to_string()))
            .await;

        let mark = Mark::from_symbol(&mv.mark)?;
        let (result, record) = {
            let mut board = game.board().lock().await;
            board.apply(mv.cell, mark)?;
            let result = board.evaluate();
            let record = result
                .is_terminal()
                .then(|| FinishedGame::from_game(&game, &board, result));
            (result, record)
        };

        if let Some(record) = record {
            debug!(result = ?result, "game reached terminal result");

            // Players are informed first, unconditionally. Persistence
            // happens afterward and its failure never reaches them.
            for player in game.players() {
                player
                    .conn()
                    .send(ServerMessage::GameEnded(result.message().to_string()))
                    .await;
            }

            self.matchmaker.remove_game_by_conn(conn.id()).await;

            if let Err(err) = self.archive.submit(record).await {
                error!(%err, "failed to persist finished game");
            }
        }

        Ok(())
    }

    async fn opponent_of(
        &self,
        conn: &Connection,
    ) -> Result<Arc<crate::network::session::Player>, RouteError> {
        let game = self
            .matchmaker
            .find_game_by_conn(conn.id())
            .await
            .ok_or(RouteError::GameNotFound(conn.id()))?;
        game.opponent_of(conn.id())
            .cloned()
            .ok_or(RouteError::OpponentNotFound(conn.id()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::GameResult;
    use crate::network::connection::Outbound;
    use crate::network::history::ArchiveError;
    use crate::network::session::Player;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    struct RecordingArchive {
        records: Mutex<Vec<FinishedGame>>,
        fail: bool,
    }

    impl RecordingArchive {
        fn new() -> Self {
            Self {
                records: Mutex::new(Vec::new()),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                records: Mutex::new(Vec::new()),
                fail: true,
            }
        }
    }

    #[async_trait]
    impl GameArchive for RecordingArchive {
        async fn submit(&self, record: FinishedGame) -> Result<(), ArchiveError> {
            if self.fail {
                return Err(ArchiveError::Refused("unavailable".to_string()));
            }
            self.records.lock().unwrap().push(record);
            Ok(())
        }
    }

    struct Fixture {
        router: MessageRouter,
        matchmaker: Arc<Matchmaker>,
        archive: Arc<RecordingArchive>,
        alice: Connection,
        bob: Connection,
        alice_rx: mpsc::Receiver<Outbound>,
        bob_rx: mpsc::Receiver<Outbound>,
    }

    async fn paired_fixture(archive: RecordingArchive) -> Fixture {
        let matchmaker = Arc::new(Matchmaker::new());
        let archive = Arc::new(archive);
        let router = MessageRouter::new(matchmaker.clone(), archive.clone());

        let (alice, mut alice_rx) = Connection::channel(16);
        let (bob, mut bob_rx) = Connection::channel(16);
        matchmaker
            .pair_or_wait(Arc::new(Player::new(alice.clone(), "alice", "cookie-a")))
            .await;
        matchmaker
            .pair_or_wait(Arc::new(Player::new(bob.clone(), "bob", "cookie-b")))
            .await;

        // Drain the pairing notifications.
        assert!(matches!(
            alice_rx.try_recv(),
            Ok(Outbound::Frame(ServerMessage::GameStarted(_)))
        ));
        assert!(matches!(
            bob_rx.try_recv(),
            Ok(Outbound::Frame(ServerMessage::GameStarted(_)))
        ));

        Fixture {
            router,
            matchmaker,
            archive,
            alice,
            bob,
            alice_rx,
            bob_rx,
        }
    }

    fn recv_frame(rx: &mut mpsc::Receiver<Outbound>) -> ServerMessage {
        match rx.try_recv() {
            Ok(Outbound::Frame(msg)) => msg,
            other => panic!("expected a frame, got {:?}", other),
        }
    }

    /// Drive one full move: alice proposes, bob relays the ack back.
    async fn play_move(fx: &mut Fixture, cell: u32, mark: &str, by_first: bool) {
        let (mover, acker) = if by_first {
            (&fx.alice, &fx.bob)
        } else {
            (&fx.bob, &fx.alice)
        };
        let mv = MoveData {
            cell,
            mark: mark.to_string(),
        };
        fx.router
            .dispatch(mover, ClientMessage::GameUpdate(mv.clone()))
            .await
            .unwrap();
        fx.router
            .dispatch(acker, ClientMessage::MoveAck(mv))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_player_message_relayed_to_opponent() {
        let mut fx = paired_fixture(RecordingArchive::new()).await;
        let payload = serde_json::json!({"text": "good luck"});

        fx.router
            .dispatch(&fx.alice, ClientMessage::PlayerMessage(payload.clone()))
            .await
            .unwrap();

        match recv_frame(&mut fx.bob_rx) {
            ServerMessage::OpponentMessage(received) => assert_eq!(received, payload),
            other => panic!("unexpected frame: {:?}", other),
        }
        assert!(fx.alice_rx.try_recv().is_err(), "sender gets nothing back");
    }

    #[tokio::test]
    async fn test_game_update_relayed_provisionally() {
        let mut fx = paired_fixture(RecordingArchive::new()).await;
        let mv = MoveData {
            cell: 4,
            mark: "X".to_string(),
        };

        fx.router
            .dispatch(&fx.alice, ClientMessage::GameUpdate(mv.clone()))
            .await
            .unwrap();

        match recv_frame(&mut fx.bob_rx) {
            ServerMessage::GameUpdated(received) => assert_eq!(received, mv),
            other => panic!("unexpected frame: {:?}", other),
        }

        // Board untouched until the opponent acknowledges.
        let game = fx
            .matchmaker
            .find_game_by_conn(fx.alice.id())
            .await
            .unwrap();
        assert!(game.board().lock().await.mark_at(4).is_none());
    }

    #[tokio::test]
    async fn test_heartbeat_touches_player_and_replies() {
        let mut fx = paired_fixture(RecordingArchive::new()).await;
        let game = fx
            .matchmaker
            .find_game_by_conn(fx.alice.id())
            .await
            .unwrap();
        let before = game.first().last_heartbeat_ms();

        fx.router
            .dispatch(&fx.alice, ClientMessage::Heartbeat)
            .await
            .unwrap();

        assert!(game.first().last_heartbeat_ms() >= before);
        match recv_frame(&mut fx.alice_rx) {
            ServerMessage::HeartbeatAck(server_time) => assert!(server_time > 0),
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_heartbeat_from_unknown_connection_fails_lookup() {
        let fx = paired_fixture(RecordingArchive::new()).await;
        let (stranger, _rx) = Connection::channel(4);

        let result = fx.router.dispatch(&stranger, ClientMessage::Heartbeat).await;
        assert!(matches!(result, Err(RouteError::PlayerNotFound(_))));
    }

    #[tokio::test]
    async fn test_move_ack_applies_and_acknowledges_mover() {
        let mut fx = paired_fixture(RecordingArchive::new()).await;

        // Bob confirms alice's move, so alice gets the receipt ack.
        fx.router
            .dispatch(
                &fx.bob,
                ClientMessage::MoveAck(MoveData {
                    cell: 0,
                    mark: "X".to_string(),
                }),
            )
            .await
            .unwrap();

        match recv_frame(&mut fx.alice_rx) {
            ServerMessage::OpponentReceivedUpdateAck(ok) => assert_eq!(ok, "Ok"),
            other => panic!("unexpected frame: {:?}", other),
        }

        let game = fx
            .matchmaker
            .find_game_by_conn(fx.alice.id())
            .await
            .unwrap();
        assert_eq!(game.board().lock().await.mark_at(0), Some(Mark::X));
    }

    #[tokio::test]
    async fn test_invalid_move_leaves_board_unchanged() {
        let fx = paired_fixture(RecordingArchive::new()).await;

        fx.router
            .dispatch(
                &fx.bob,
                ClientMessage::MoveAck(MoveData {
                    cell: 0,
                    mark: "X".to_string(),
                }),
            )
            .await
            .unwrap();

        // Same cell again: rejected, nothing overwritten.
        let result = fx
            .router
            .dispatch(
                &fx.alice,
                ClientMessage::MoveAck(MoveData {
                    cell: 0,
                    mark: "O".to_string(),
                }),
            )
            .await;
        assert!(matches!(
            result,
            Err(RouteError::InvalidMove(InvalidMove::CellOccupied { .. }))
        ));

        let game = fx
            .matchmaker
            .find_game_by_conn(fx.alice.id())
            .await
            .unwrap();
        assert_eq!(game.board().lock().await.mark_at(0), Some(Mark::X));
        assert!(fx.alice.is_open() && fx.bob.is_open());
    }

    #[tokio::test]
    async fn test_bad_symbol_rejected_before_mutation() {
        let fx = paired_fixture(RecordingArchive::new()).await;

        let result = fx
            .router
            .dispatch(
                &fx.bob,
                ClientMessage::MoveAck(MoveData {
                    cell: 3,
                    mark: "Q".to_string(),
                }),
            )
            .await;

        assert!(matches!(
            result,
            Err(RouteError::InvalidMove(InvalidMove::UnknownMark(_)))
        ));
        let game = fx
            .matchmaker
            .find_game_by_conn(fx.alice.id())
            .await
            .unwrap();
        assert!(game.board().lock().await.mark_at(3).is_none());
    }

    #[tokio::test]
    async fn test_winning_game_notifies_both_and_reports() {
        let mut fx = paired_fixture(RecordingArchive::new()).await;

        // X takes the top row; O plays the middle row.
        play_move(&mut fx, 0, "X", true).await;
        play_move(&mut fx, 4, "O", false).await;
        play_move(&mut fx, 1, "X", true).await;
        play_move(&mut fx, 5, "O", false).await;
        play_move(&mut fx, 2, "X", true).await;

        // Drain the relay/ack chatter and keep the terminal frames.
        let mut alice_ended = None;
        while let Ok(Outbound::Frame(msg)) = fx.alice_rx.try_recv() {
            if let ServerMessage::GameEnded(text) = msg {
                alice_ended = Some(text);
            }
        }
        let mut bob_ended = None;
        while let Ok(Outbound::Frame(msg)) = fx.bob_rx.try_recv() {
            if let ServerMessage::GameEnded(text) = msg {
                bob_ended = Some(text);
            }
        }
        assert_eq!(alice_ended.as_deref(), Some("1st player won"));
        assert_eq!(bob_ended.as_deref(), Some("1st player won"));

        let records = fx.archive.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].first_player_name, "alice");
        assert_eq!(records[0].second_player_name, "bob");
        assert_eq!(records[0].winner_name, "alice");
        assert_eq!(records[0].winning_mark_count, 3);
        assert!(records[0].ended_at >= records[0].started_at);
        drop(records);

        // Terminal and reported: the game is gone from the registry.
        assert_eq!(fx.matchmaker.game_count().await, 0);
    }

    #[tokio::test]
    async fn test_draw_reports_empty_winner() {
        let mut fx = paired_fixture(RecordingArchive::new()).await;

        // X O X / X O O / O X X — full board, no triple.
        let moves: [(u32, &str, bool); 9] = [
            (0, "X", true),
            (1, "O", false),
            (2, "X", true),
            (4, "O", false),
            (3, "X", true),
            (5, "O", false),
            (7, "X", true),
            (6, "O", false),
            (8, "X", true),
        ];
        for (cell, mark, by_first) in moves {
            play_move(&mut fx, cell, mark, by_first).await;
        }

        let records = fx.archive.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].winner_name, "");
        assert_eq!(records[0].winning_mark_count, 0);
    }

    #[tokio::test]
    async fn test_archive_failure_is_swallowed() {
        let mut fx = paired_fixture(RecordingArchive::failing()).await;

        play_move(&mut fx, 0, "X", true).await;
        play_move(&mut fx, 4, "O", false).await;
        play_move(&mut fx, 1, "X", true).await;
        play_move(&mut fx, 5, "O", false).await;
        play_move(&mut fx, 2, "X", true).await;

        // Both players still learned the outcome.
        let mut ended = 0;
        while let Ok(Outbound::Frame(msg)) = fx.alice_rx.try_recv() {
            if matches!(msg, ServerMessage::GameEnded(_)) {
                ended += 1;
            }
        }
        while let Ok(Outbound::Frame(msg)) = fx.bob_rx.try_recv() {
            if matches!(msg, ServerMessage::GameEnded(_)) {
                ended += 1;
            }
        }
        assert_eq!(ended, 2);
        assert_eq!(fx.matchmaker.game_count().await, 0);
    }

    #[tokio::test]
    async fn test_malformed_frame_dropped_quietly() {
        let fx = paired_fixture(RecordingArchive::new()).await;

        fx.router.route_frame(&fx.alice, "not json at all").await;
        fx.router
            .route_frame(&fx.alice, r#"{"kind":"SelfDestruct","data":1}"#)
            .await;

        assert!(fx.alice.is_open());
        assert_eq!(fx.matchmaker.game_count().await, 1);
    }

    #[tokio::test]
    async fn test_message_without_game_is_lookup_failure() {
        let matchmaker = Arc::new(Matchmaker::new());
        let archive: Arc<dyn GameArchive> = Arc::new(RecordingArchive::new());
        let router = MessageRouter::new(matchmaker.clone(), archive);

        // A lonely waiting player has no opponent to relay to.
        let (conn, _rx) = Connection::channel(4);
        matchmaker
            .pair_or_wait(Arc::new(Player::new(conn.clone(), "alice", "cookie-a")))
            .await;

        let result = router
            .dispatch(&conn, ClientMessage::PlayerMessage(serde_json::json!("hi")))
            .await;
        assert!(matches!(result, Err(RouteError::GameNotFound(_))));
        assert!(conn.is_open());
    }
}
