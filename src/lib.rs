//! Gravity Garden - a collaborative physics puzzle
//!
//! Core modules:
//! - `sim`: Deterministic simulation (RNG, pieces, physics, puzzle generation)
//! - `solver`: Background pathfinding and difficulty scoring
//! - `net`: Wire protocol, authoritative session and WebSocket server
//! - `leaderboard`: Player handles and completion counts
//! - `persistence`: Snapshot save/load so a restart resumes the same puzzle
//! - `settings`: Server configuration

pub mod error;
pub mod leaderboard;
pub mod net;
pub mod persistence;
pub mod settings;
pub mod sim;
pub mod solver;

pub use error::{Result, ServerError};
pub use leaderboard::{Leaderboard, LeaderboardEntry};
pub use settings::ServerSettings;

use glam::Vec2;

/// Game configuration constants
pub mod consts {
    /// Board dimensions (pixels)
    pub const BOARD_WIDTH: f32 = 800.0;
    pub const BOARD_HEIGHT: f32 = 600.0;
    /// Keep-out band along the board edges for generated pieces
    pub const BOARD_MARGIN: f32 = 20.0;

    /// Minimum spacing between generated entities
    pub const MIN_DISTANCE: f32 = 40.0;
    /// Rejection-sampling attempts before accepting an unchecked position
    pub const MAX_PLACEMENT_ATTEMPTS: u32 = 30;
    /// Ball spawn offset from the top-left margin corner
    pub const BALL_SPAWN_OFFSET: f32 = 30.0;

    /// Downward acceleration per unit of simulated time
    pub const GRAVITY: f32 = 0.5;
    /// Largest integration sub-step
    pub const MAX_SUB_STEP: f32 = 0.25;
    /// Velocity retained on the colliding axis after a bounce
    pub const RESTITUTION: f32 = 0.5;

    /// Ball defaults
    pub const BALL_RADIUS: f32 = 8.0;
    /// Extra slack added to the ball radius for the success test
    pub const COMPLETION_RADIUS: f32 = 8.0;

    /// Box size for pieces without explicit dimensions
    pub const DEFAULT_PIECE_SIZE: f32 = 20.0;
    /// Ramps only react inside a square of this half-size
    pub const RAMP_REACH: f32 = 12.0;
    /// Fan thrust radius
    pub const FAN_RANGE: f32 = 40.0;
    /// Spring trigger distance beyond the ball radius
    pub const SPRING_RANGE: f32 = 12.0;

    /// Generated piece defaults
    pub const FAN_POWER: f32 = 1.0;
    pub const SPRING_POWER: f32 = 8.0;
    pub const WALL_WIDTH: f32 = 60.0;
    pub const WALL_HEIGHT: f32 = 20.0;
}

/// Clamp a point so it stays on the board
#[inline]
pub fn clamp_to_board(pos: Vec2) -> Vec2 {
    pos.clamp(
        Vec2::ZERO,
        Vec2::new(consts::BOARD_WIDTH, consts::BOARD_HEIGHT),
    )
}

/// Wall-clock milliseconds since the Unix epoch
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
