//! JSON wire protocol
//!
//! Every frame is a JSON object tagged by `type`. Unknown or malformed frames
//! are dropped by the caller.

use serde::{Deserialize, Serialize};

use crate::leaderboard::LeaderboardEntry;
use crate::sim::{ClientId, Piece, PuzzleState};
use crate::solver::Solution;

/// Client -> server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    AddPiece { piece: Piece },
    MovePiece { id: String, x: f32, y: f32 },
    RotatePiece { id: String },
    RemovePiece { id: String },
    /// Client-simulated ball state, mirrored as-is
    BallUpdate { x: f32, y: f32, vx: f32, vy: f32 },
    ResetPuzzle,
    ResetLevel,
    SetEmoji { emoji: String },
    Chat { text: String },
    Cursor { x: f32, y: f32 },
}

impl ClientMessage {
    /// Parse a text frame, `None` for anything malformed or unknown
    pub fn parse(text: &str) -> Option<Self> {
        match serde_json::from_str::<Self>(text) {
            Ok(msg) if msg.is_finite() => Some(msg),
            Ok(_) => {
                log::debug!("Dropping message with non-finite numbers");
                None
            }
            Err(e) => {
                log::debug!("Dropping malformed message: {}", e);
                None
            }
        }
    }

    /// Out-of-range JSON numbers parse as inf; those must never reach state
    pub fn is_finite(&self) -> bool {
        match self {
            ClientMessage::AddPiece { piece } => piece.is_finite(),
            ClientMessage::MovePiece { x, y, .. } | ClientMessage::Cursor { x, y } => {
                x.is_finite() && y.is_finite()
            }
            ClientMessage::BallUpdate { x, y, vx, vy } => {
                [x, y, vx, vy].iter().all(|v| v.is_finite())
            }
            ClientMessage::RotatePiece { .. }
            | ClientMessage::RemovePiece { .. }
            | ClientMessage::ResetPuzzle
            | ClientMessage::ResetLevel
            | ClientMessage::SetEmoji { .. }
            | ClientMessage::Chat { .. } => true,
        }
    }
}

/// Server -> client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    Welcome {
        client_id: ClientId,
        emoji: String,
        difficulty: u32,
        puzzle: PuzzleState,
        leaderboard: Vec<LeaderboardEntry>,
    },
    PlayerJoined {
        client_id: ClientId,
        emoji: String,
    },
    PlayerLeft {
        client_id: ClientId,
        emoji: String,
    },
    PieceAdded {
        piece: Piece,
    },
    PieceMoved {
        id: String,
        x: f32,
        y: f32,
    },
    PieceRotated {
        piece: Piece,
    },
    PieceRemoved {
        id: String,
    },
    BallUpdate {
        client_id: ClientId,
        piece: Piece,
    },
    PuzzleComplete {
        client_id: ClientId,
        emoji: String,
        seed: String,
        difficulty: u32,
    },
    NewPuzzle {
        puzzle: PuzzleState,
    },
    PuzzleScored {
        seed: String,
        solution: Solution,
    },
    Leaderboard {
        entries: Vec<LeaderboardEntry>,
    },
    EmojiChanged {
        client_id: ClientId,
        emoji: String,
    },
    Chat {
        client_id: ClientId,
        emoji: String,
        text: String,
    },
    Cursor {
        client_id: ClientId,
        emoji: String,
        x: f32,
        y: f32,
    },
}

impl ServerMessage {
    /// Wire name of the message, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Welcome { .. } => "welcome",
            ServerMessage::PlayerJoined { .. } => "playerJoined",
            ServerMessage::PlayerLeft { .. } => "playerLeft",
            ServerMessage::PieceAdded { .. } => "pieceAdded",
            ServerMessage::PieceMoved { .. } => "pieceMoved",
            ServerMessage::PieceRotated { .. } => "pieceRotated",
            ServerMessage::PieceRemoved { .. } => "pieceRemoved",
            ServerMessage::BallUpdate { .. } => "ballUpdate",
            ServerMessage::PuzzleComplete { .. } => "puzzleComplete",
            ServerMessage::NewPuzzle { .. } => "newPuzzle",
            ServerMessage::PuzzleScored { .. } => "puzzleScored",
            ServerMessage::Leaderboard { .. } => "leaderboard",
            ServerMessage::EmojiChanged { .. } => "emojiChanged",
            ServerMessage::Chat { .. } => "chat",
            ServerMessage::Cursor { .. } => "cursor",
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
