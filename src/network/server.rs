//! WebSocket Game Server
//!
//! Top-level connection lifecycle: accepts sockets, runs the ordered
//! connect checks, wires disconnect and transport-error events to the
//! matchmaker, and hosts the heartbeat sweep. Everything a connection
//! does after acceptance flows through the `MessageRouter`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::network::auth::Authenticator;
use crate::network::connection::{Connection, Outbound};
use crate::network::heartbeat::HeartbeatMonitor;
use crate::network::history::GameArchive;
use crate::network::protocol::ServerMessage;
use crate::network::router::MessageRouter;
use crate::network::session::{Matchmaker, Player};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent games.
    pub max_games: usize,
    /// Silence threshold after which a connection is force-closed.
    pub heartbeat_timeout: Duration,
    /// Period of the liveness sweep.
    pub heartbeat_sweep_interval: Duration,
    /// How long a rejected client gets to close before the server does.
    pub rejection_grace: Duration,
    /// Auth collaborator: session verification endpoint.
    pub verify_session_url: String,
    /// Auth collaborator: username resolution endpoint.
    pub get_username_url: String,
    /// History collaborator: finished-game persistence endpoint.
    pub save_game_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_games: 100,
            heartbeat_timeout: Duration::from_secs(30),
            heartbeat_sweep_interval: Duration::from_secs(10),
            rejection_grace: Duration::from_secs(10),
            verify_session_url: "http://localhost:8093/api/v1/auth/verifySignedIn".to_string(),
            get_username_url: "http://localhost:8093/api/v1/auth/getUsername".to_string(),
            save_game_url: "http://localhost:8092/api/v1/game/save".to_string(),
        }
    }
}

impl ServerConfig {
    /// Build the config from environment variables, falling back to the
    /// defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        fn secs(var: &str) -> Option<Duration> {
            std::env::var(var).ok()?.parse().ok().map(Duration::from_secs)
        }

        Self {
            bind_addr: std::env::var("BIND_ADDR")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.bind_addr),
            max_games: std::env::var("MAX_GAMES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_games),
            heartbeat_timeout: secs("HEARTBEAT_TIMEOUT_SECS").unwrap_or(defaults.heartbeat_timeout),
            heartbeat_sweep_interval: secs("HEARTBEAT_SWEEP_SECS")
                .unwrap_or(defaults.heartbeat_sweep_interval),
            rejection_grace: secs("REJECTION_GRACE_SECS").unwrap_or(defaults.rejection_grace),
            verify_session_url: std::env::var("VERIFY_SESSION_URL")
                .unwrap_or(defaults.verify_session_url),
            get_username_url: std::env::var("GET_USERNAME_URL")
                .unwrap_or(defaults.get_username_url),
            save_game_url: std::env::var("SAVE_GAME_URL").unwrap_or(defaults.save_game_url),
        }
    }
}

/// Why a connection was refused. Expected control flow, not a fault:
/// the reason is sent to the client before the grace-period close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionReason {
    /// Active game count reached the configured maximum.
    Capacity,
    /// The auth collaborator did not vouch for the session.
    Unauthenticated,
    /// This identity already occupies the waiting slot.
    AlreadyWaiting,
    /// This identity already belongs to an active game.
    AlreadyPlaying,
}

impl RejectionReason {
    /// Text sent to the client in the `SessionRejected` frame.
    pub fn message(&self) -> &'static str {
        match self {
            RejectionReason::Capacity => {
                "Maximum number of active games exceeded. Try again later"
            }
            RejectionReason::Unauthenticated => "User unauthenticated",
            RejectionReason::AlreadyWaiting => "Player is already waiting for an opponent",
            RejectionReason::AlreadyPlaying => "There can only be one game per player",
        }
    }
}

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// The game server. Owns all shared state and injects it into the
/// router and the heartbeat monitor.
pub struct GameServer {
    config: ServerConfig,
    matchmaker: Arc<Matchmaker>,
    router: Arc<MessageRouter>,
    auth: Arc<dyn Authenticator>,
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a server over the given collaborators.
    pub fn new(
        config: ServerConfig,
        auth: Arc<dyn Authenticator>,
        archive: Arc<dyn GameArchive>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let matchmaker = Arc::new(Matchmaker::new());
        let router = Arc::new(MessageRouter::new(matchmaker.clone(), archive));

        Self {
            config,
            matchmaker,
            router,
            auth,
            shutdown_tx,
        }
    }

    /// Run the accept loop until shutdown.
    pub async fn run(self: Arc<Self>) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!("Game server listening on {}", self.config.bind_addr);

        let monitor = HeartbeatMonitor::new(
            self.matchmaker.clone(),
            self.config.heartbeat_timeout,
            self.config.heartbeat_sweep_interval,
        );
        let heartbeat_handle = tokio::spawn(monitor.run());

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            debug!("New connection from {}", addr);
                            let server = self.clone();
                            tokio::spawn(async move {
                                server.handle_socket(stream, addr).await;
                            });
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        heartbeat_handle.abort();
        Ok(())
    }

    /// Drive one socket: WebSocket handshake (capturing the session
    /// cookie), connect checks, then the read loop until it closes.
    async fn handle_socket(&self, stream: TcpStream, addr: SocketAddr) {
        let mut cookie_header: Option<String> = None;
        let callback = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            cookie_header = req
                .headers()
                .get("cookie")
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned);
            Ok(resp)
        };

        let ws_stream = match tokio_tungstenite::accept_hdr_async(stream, callback).await {
            Ok(ws) => ws,
            Err(e) => {
                error!("WebSocket handshake failed for {}: {}", addr, e);
                return;
            }
        };

        let (mut ws_sender, mut ws_receiver) = ws_stream.split();
        let (conn, mut outbound_rx) = Connection::channel(64);

        // Writer task: the only owner of the sink. Sends for different
        // connections never share a lock.
        let writer_conn = conn.clone();
        let writer = tokio::spawn(async move {
            while let Some(outbound) = outbound_rx.recv().await {
                match outbound {
                    Outbound::Frame(msg) => {
                        let text = match msg.to_json() {
                            Ok(t) => t,
                            Err(e) => {
                                error!("Failed to serialize message: {}", e);
                                continue;
                            }
                        };
                        if ws_sender.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Outbound::Close => {
                        let _ = ws_sender.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
            writer_conn.mark_closed();
        });

        let accepted = self
            .on_connect(conn.clone(), cookie_header.as_deref())
            .await
            .is_ok();
        if !accepted {
            debug!("Connection {} not registered, draining until close", addr);
        }

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        loop {
            tokio::select! {
                msg = ws_receiver.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.router.route_frame(&conn, &text).await;
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            debug!("Client {} disconnected", addr);
                            break;
                        }
                        Some(Err(e)) => {
                            self.on_transport_error(&conn, &e);
                            break;
                        }
                        _ => {}
                    }
                }
                _ = shutdown_rx.recv() => {
                    conn.close().await;
                    break;
                }
            }
        }

        writer.abort();
        conn.mark_closed();
        self.on_disconnect(&conn).await;
        info!("Client {} cleaned up", addr);
    }

    /// Ordered connect checks; the first failure wins. On failure the
    /// typed reason is sent to the client and the connection is closed
    /// after the grace period unless the client closes first. On success
    /// the player is handed to the matchmaker.
    pub async fn on_connect(
        &self,
        conn: Connection,
        cookie_header: Option<&str>,
    ) -> Result<(), RejectionReason> {
        let verdict = self.screen(&conn, cookie_header).await;
        match verdict {
            Ok(player) => {
                info!(player = player.name(), conn = %player.conn().id(), "connection accepted");
                self.matchmaker.pair_or_wait(player).await;
                Ok(())
            }
            Err(reason) => {
                self.reject(&conn, reason).await;
                Err(reason)
            }
        }
    }

    async fn screen(
        &self,
        conn: &Connection,
        cookie_header: Option<&str>,
    ) -> Result<Arc<Player>, RejectionReason> {
        if self.matchmaker.game_count().await >= self.config.max_games {
            return Err(RejectionReason::Capacity);
        }

        let identity = cookie_header
            .map(extract_session_cookie)
            .filter(|c| !c.is_empty())
            .ok_or(RejectionReason::Unauthenticated)?;

        let name = self
            .auth
            .authenticate(&identity)
            .await
            .map_err(|err| {
                info!(%err, "unauthorized attempt of connection");
                RejectionReason::Unauthenticated
            })?;

        // Identity equality is exact-string; no normalization.
        if self.matchmaker.is_identity_waiting(&identity).await {
            return Err(RejectionReason::AlreadyWaiting);
        }
        if self.matchmaker.is_identity_playing(&identity).await {
            return Err(RejectionReason::AlreadyPlaying);
        }

        Ok(Arc::new(Player::new(conn.clone(), name, identity)))
    }

    async fn reject(&self, conn: &Connection, reason: RejectionReason) {
        warn!(conn = %conn.id(), reason = reason.message(), "session rejected");
        conn.send(ServerMessage::SessionRejected(reason.message().to_string()))
            .await;

        // Give the client the grace period to hang up on its own.
        let conn = conn.clone();
        let grace = self.config.rejection_grace;
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            if conn.is_open() {
                conn.close().await;
            }
        });
    }

    /// Disconnect cleanup. Idempotent: repeated calls for an already
    /// removed connection are no-ops.
    pub async fn on_disconnect(&self, conn: &Connection) {
        if let Some(player) = self.matchmaker.clear_waiting_by_conn(conn.id()).await {
            info!(player = player.name(), "waiting player left, slot cleared");
            return;
        }

        if let Some(game) = self.matchmaker.remove_game_by_conn(conn.id()).await {
            if let Some(opponent) = game.opponent_of(conn.id()) {
                if opponent.conn().is_open() {
                    opponent
                        .conn()
                        .send(ServerMessage::PeerDisconnected(
                            "Your opponent has disconnected".to_string(),
                        ))
                        .await;
                }
            }
        }
    }

    /// Transport errors are logged only; the transport layer follows up
    /// with the disconnect event that does the cleanup.
    pub fn on_transport_error(&self, conn: &Connection, err: &tokio_tungstenite::tungstenite::Error) {
        error!(conn = %conn.id(), "transport error: {}", err);
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Number of active games.
    pub async fn game_count(&self) -> usize {
        self.matchmaker.game_count().await
    }

    /// The injected registry (for wiring and tests).
    pub fn matchmaker(&self) -> &Arc<Matchmaker> {
        &self.matchmaker
    }
}

/// Pull the session value out of a cookie header.
fn extract_session_cookie(header: &str) -> String {
    header.replace("SESSION=", "").trim().to_string()
}
