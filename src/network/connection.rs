//! Connection handle.
//!
//! The transport layer owns the socket; the core holds this handle and
//! talks to the socket's writer task through an outbound channel. Closing
//! is a request on the same channel, so it is naturally idempotent and
//! tolerates a peer that already went away.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::network::protocol::ServerMessage;

/// Identifies one accepted connection.
pub type ConnectionId = Uuid;

/// What the core can ask of the writer task.
#[derive(Debug)]
pub enum Outbound {
    /// Send a frame to the client.
    Frame(ServerMessage),
    /// Close the underlying socket and stop the writer.
    Close,
}

/// Handle to one duplex channel. Cheap to clone; all clones share the
/// same outbound queue and open flag.
#[derive(Debug, Clone)]
pub struct Connection {
    id: ConnectionId,
    tx: mpsc::Sender<Outbound>,
    open: Arc<AtomicBool>,
}

impl Connection {
    /// Create a connection handle plus the receiving end its writer task
    /// (or a test) drains.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(capacity);
        let conn = Self {
            id: Uuid::new_v4(),
            tx,
            open: Arc::new(AtomicBool::new(true)),
        };
        (conn, rx)
    }

    /// Connection identity.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Whether the writer task is still attached to a live socket.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Queue a frame for the client. Returns `false` if the connection
    /// is already gone; callers treat that as a dropped send.
    pub async fn send(&self, msg: ServerMessage) -> bool {
        self.tx.send(Outbound::Frame(msg)).await.is_ok()
    }

    /// Request the socket be closed. Idempotent; returns `false` if the
    /// connection had already gone away.
    pub async fn close(&self) -> bool {
        self.tx.send(Outbound::Close).await.is_ok()
    }

    /// Marks the handle closed. Called by the writer task when it exits.
    pub fn mark_closed(&self) {
        self.open.store(false, Ordering::Release);
    }
}

impl PartialEq for Connection {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Connection {}
