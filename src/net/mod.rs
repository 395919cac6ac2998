//! Multiplayer networking
//!
//! - `protocol`: JSON message types
//! - `session`: the authoritative shared puzzle session (no I/O)
//! - `server`: WebSocket transport and the session actor

pub mod protocol;
pub mod server;
pub mod session;

pub use protocol::{ClientMessage, ServerMessage};
pub use server::PuzzleServer;
pub use session::{ConnId, Connection, ConnectionPhase, Outbound, Session, SessionEffects};
