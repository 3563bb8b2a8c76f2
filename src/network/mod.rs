//! Networking layer: WebSocket transport, session lifecycle, matchmaking
//! and the external collaborators (auth, game history).

pub mod auth;
pub mod connection;
pub mod heartbeat;
pub mod history;
pub mod protocol;
pub mod router;
pub mod server;
pub mod session;

pub use auth::{AuthError, Authenticator, HttpAuthenticator};
pub use connection::{Connection, ConnectionId, Outbound};
pub use heartbeat::HeartbeatMonitor;
pub use history::{ArchiveError, FinishedGame, GameArchive, HttpGameArchive};
pub use protocol::{ClientMessage, MoveData, ServerMessage};
pub use router::MessageRouter;
pub use server::{GameServer, GameServerError, RejectionReason, ServerConfig};
pub use session::{ActiveGame, Matchmaker, Player};
