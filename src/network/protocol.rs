//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! One JSON object per frame, shaped `{"kind": ..., "data": ...}`.

use serde::{Deserialize, Serialize};

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data")]
pub enum ClientMessage {
    /// Free-form payload relayed verbatim to the opponent.
    PlayerMessage(serde_json::Value),

    /// A move chosen by the sender, relayed provisionally to the opponent.
    GameUpdate(MoveData),

    /// Liveness signal.
    Heartbeat,

    /// Opponent's confirmation of a relayed update. Triggers the
    /// authoritative board mutation.
    MoveAck(MoveData),
}

/// A single move on the wire: cell index and the symbol placed there.
/// The symbol stays a string here; it is validated when applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveData {
    /// Chosen cell index (valid range 0..=8, checked on apply).
    pub cell: u32,
    /// Chosen symbol ("X" or "O", checked on apply).
    pub mark: String,
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data")]
pub enum ServerMessage {
    /// Both players are paired; the payload names the receiver's ordinal
    /// ("1st player" moves first and plays X).
    GameStarted(String),

    /// Opponent's provisional move, relayed as-is.
    GameUpdated(MoveData),

    /// Opponent's free-form payload, relayed as-is.
    OpponentMessage(serde_json::Value),

    /// The opponent confirmed receipt of the sender's move.
    OpponentReceivedUpdateAck(String),

    /// Heartbeat reply carrying the server clock (epoch milliseconds).
    HeartbeatAck(i64),

    /// Terminal result message, sent to both players.
    GameEnded(String),

    /// The paired session went away.
    PeerDisconnected(String),

    /// Connection was rejected; the payload explains why. The server
    /// force-closes after a grace period unless the client closes first.
    SessionRejected(String),
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}
