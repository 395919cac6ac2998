//! Deterministic simulation module
//!
//! All gameplay logic lives here. This module must be pure and deterministic:
//! - Seeded RNG only
//! - Stable iteration order (piece list order)
//! - No networking or platform dependencies

pub mod collision;
pub mod generator;
pub mod rng;
pub mod state;
pub mod tick;

pub use collision::{BallBody, CollisionResult, reflect_velocity, resolve_piece};
pub use generator::{PlacementStats, generate_puzzle, generate_puzzle_with_stats};
pub use rng::{PuzzleRng, create_rng};
pub use state::{ClientId, Piece, PieceKind, Point, PuzzleState, RampDirection, Target};
pub use tick::{SimOutcome, simulate, update_ball};
