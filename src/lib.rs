//! # Tic-Tac-Toe Game Server
//!
//! Real-time two-player tic-tac-toe over WebSockets: session screening,
//! lonely-player matchmaking, move relay and validation, heartbeat-based
//! liveness, and finished-game reporting to an external history service.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  TIC-TAC-TOE SERVER                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  game/              - Board rules (pure, no I/O)             │
//! │  └── board.rs       - 3x3 board, move validation, outcome    │
//! │                                                              │
//! │  network/           - Sessions and collaborators             │
//! │  ├── server.rs      - WebSocket accept loop, connect checks  │
//! │  ├── connection.rs  - Outbound channel per socket            │
//! │  ├── protocol.rs    - Wire message types                     │
//! │  ├── session.rs     - Players, active games, matchmaking     │
//! │  ├── router.rs      - Inbound frame dispatch                 │
//! │  ├── heartbeat.rs   - Liveness sweep                         │
//! │  ├── auth.rs        - Session verification collaborator      │
//! │  └── history.rs     - Finished-game persistence              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Session Guarantees
//!
//! - One waiting slot: the first unpaired player waits, the next one
//!   pairs with them. The earlier arrival always moves first.
//! - One session per identity: a player cannot wait or play twice.
//! - Rejected connections are told why, then closed after a grace
//!   period if the client does not hang up first.
//! - Board state is authoritative on the server; an out-of-turn or
//!   occupied-cell move never corrupts it.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod game;
pub mod network;

// Re-export commonly used types
pub use game::{Board, GameResult, InvalidMove, Mark};
pub use network::{
    ClientMessage, Connection, GameServer, Matchmaker, MoveData, ServerConfig, ServerMessage,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
