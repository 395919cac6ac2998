//! Puzzle state and piece types
//!
//! Everything here is serialized both on the wire and in snapshots, so field
//! names follow the client's camelCase JSON layout.

use std::fmt;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::consts::*;
use crate::solver::Solution;

/// Stable per-player handle, derived from the remote address
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(pub String);

impl ClientId {
    pub fn from_addr(addr: &std::net::SocketAddr) -> Self {
        Self(addr.ip().to_string())
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClientId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Incline orientation of a 45° ramp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RampDirection {
    Left,
    #[default]
    Right,
}

impl RampDirection {
    pub fn flipped(self) -> Self {
        match self {
            RampDirection::Left => RampDirection::Right,
            RampDirection::Right => RampDirection::Left,
        }
    }
}

fn default_size() -> f32 {
    DEFAULT_PIECE_SIZE
}

fn default_ball_radius() -> f32 {
    BALL_RADIUS
}

fn default_fan_power() -> f32 {
    FAN_POWER
}

fn default_spring_power() -> f32 {
    SPRING_POWER
}

/// Per-type payload, tagged by `type` on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PieceKind {
    Block,
    Ramp {
        #[serde(default)]
        direction: RampDirection,
    },
    Fan {
        #[serde(default = "default_fan_power")]
        power: f32,
    },
    Spring {
        #[serde(default = "default_spring_power")]
        power: f32,
    },
    Wall {
        #[serde(default = "default_size")]
        width: f32,
        #[serde(default = "default_size")]
        height: f32,
    },
    Ball {
        #[serde(default)]
        vx: f32,
        #[serde(default)]
        vy: f32,
        #[serde(default = "default_ball_radius")]
        radius: f32,
    },
}

impl PieceKind {
    pub fn ball() -> Self {
        PieceKind::Ball {
            vx: 0.0,
            vy: 0.0,
            radius: BALL_RADIUS,
        }
    }

    pub fn wall() -> Self {
        PieceKind::Wall {
            width: WALL_WIDTH,
            height: WALL_HEIGHT,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PieceKind::Block => "block",
            PieceKind::Ramp { .. } => "ramp",
            PieceKind::Fan { .. } => "fan",
            PieceKind::Spring { .. } => "spring",
            PieceKind::Wall { .. } => "wall",
            PieceKind::Ball { .. } => "ball",
        }
    }
}

/// A placeable game object (or the ball)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Piece {
    #[serde(default)]
    pub id: String,
    pub x: f32,
    pub y: f32,
    /// Who placed it; generated pieces have no owner and are immutable
    #[serde(default)]
    pub owner_id: Option<ClientId>,
    /// Fade-in start (ms since epoch, 0 = no fade). Not gameplay-affecting.
    #[serde(default)]
    pub spawn_time: u64,
    /// Immovable by physics
    #[serde(default, rename = "static")]
    pub is_static: bool,
    #[serde(flatten)]
    pub kind: PieceKind,
}

impl Piece {
    pub fn new(id: impl Into<String>, pos: Vec2, kind: PieceKind) -> Self {
        Self {
            id: id.into(),
            x: pos.x,
            y: pos.y,
            owner_id: None,
            spawn_time: 0,
            is_static: false,
            kind,
        }
    }

    pub fn with_static(mut self, is_static: bool) -> Self {
        self.is_static = is_static;
        self
    }

    #[inline]
    pub fn pos(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    #[inline]
    pub fn set_pos(&mut self, pos: Vec2) {
        self.x = pos.x;
        self.y = pos.y;
    }

    pub fn is_ball(&self) -> bool {
        matches!(self.kind, PieceKind::Ball { .. })
    }

    pub fn is_owned_by(&self, client: &ClientId) -> bool {
        self.owner_id.as_ref() == Some(client)
    }

    /// Half size of the piece's bounding box
    pub fn half_extents(&self) -> Vec2 {
        match self.kind {
            PieceKind::Wall { width, height } => Vec2::new(width, height) / 2.0,
            PieceKind::Ball { radius, .. } => Vec2::splat(radius),
            _ => Vec2::splat(DEFAULT_PIECE_SIZE / 2.0),
        }
    }

    /// Rotate a quarter turn: ramps flip, walls swap their dimensions
    pub fn rotate(&mut self) {
        match &mut self.kind {
            PieceKind::Ramp { direction } => *direction = direction.flipped(),
            PieceKind::Wall { width, height } => std::mem::swap(width, height),
            PieceKind::Block
            | PieceKind::Fan { .. }
            | PieceKind::Spring { .. }
            | PieceKind::Ball { .. } => {}
        }
    }

    /// Every coordinate and parameter is a finite number. JSON has no
    /// encoding for inf/NaN, so anything else cannot be snapshotted.
    pub fn is_finite(&self) -> bool {
        let kind = match self.kind {
            PieceKind::Block | PieceKind::Ramp { .. } => true,
            PieceKind::Fan { power } | PieceKind::Spring { power } => power.is_finite(),
            PieceKind::Wall { width, height } => width.is_finite() && height.is_finite(),
            PieceKind::Ball { vx, vy, radius } => {
                vx.is_finite() && vy.is_finite() && radius.is_finite()
            }
        };
        kind && self.pos().is_finite()
    }
}

/// A point on the board (target, path waypoints)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

impl From<Vec2> for Point {
    fn from(v: Vec2) -> Self {
        Self { x: v.x, y: v.y }
    }
}

impl From<Point> for Vec2 {
    fn from(p: Point) -> Self {
        Vec2::new(p.x, p.y)
    }
}

/// Where the ball has to go
pub type Target = Point;

/// A full level: piece set + target + the seed and difficulty it came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PuzzleState {
    pub seed: String,
    pub difficulty: u32,
    pub pieces: Vec<Piece>,
    pub target: Target,
    /// Solver annotation, attached once scoring finishes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solution: Option<Solution>,
}

impl PuzzleState {
    pub fn ball(&self) -> Option<&Piece> {
        self.pieces.iter().find(|p| p.is_ball())
    }

    pub fn ball_mut(&mut self) -> Option<&mut Piece> {
        self.pieces.iter_mut().find(|p| p.is_ball())
    }

    pub fn find(&self, id: &str) -> Option<&Piece> {
        self.pieces.iter().find(|p| p.id == id)
    }

    pub fn find_mut(&mut self, id: &str) -> Option<&mut Piece> {
        self.pieces.iter_mut().find(|p| p.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.find(id).is_some()
    }

    /// Remove a piece by id, returning it
    pub fn remove(&mut self, id: &str) -> Option<Piece> {
        let idx = self.pieces.iter().position(|p| p.id == id)?;
        Some(self.pieces.remove(idx))
    }

    /// Add a piece, replacing any existing ball when the new piece is a ball
    pub fn insert(&mut self, piece: Piece) {
        if piece.is_ball() {
            self.pieces.retain(|p| !p.is_ball());
        }
        self.pieces.push(piece);
    }

    /// Ball has reached the target
    pub fn is_complete(&self) -> bool {
        let Some(ball) = self.ball() else {
            return false;
        };
        let PieceKind::Ball { radius, .. } = ball.kind else {
            return false;
        };
        ball.pos().distance(self.target.into()) < radius + COMPLETION_RADIUS
    }

    /// Stamp every piece with a fade-in start time
    pub fn stamp(&mut self, now_ms: u64) {
        for piece in &mut self.pieces {
            piece.spawn_time = now_ms;
        }
    }

    /// Ids of all pieces, in list order
    pub fn piece_ids(&self) -> Vec<&str> {
        self.pieces.iter().map(|p| p.id.as_str()).collect()
    }
}
