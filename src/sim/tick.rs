//! Sub-stepped ball integration
//!
//! Clients call [`update_ball`] once per rendered frame; the server never
//! re-simulates and only mirrors the reported ball state.

use super::collision::{BallBody, resolve_piece};
use super::state::{Piece, PieceKind, PuzzleState};
use crate::consts::*;

impl BallBody {
    /// Extract the dynamic state from a ball piece
    pub fn from_piece(piece: &Piece) -> Option<Self> {
        match piece.kind {
            PieceKind::Ball { vx, vy, radius } => Some(Self {
                pos: piece.pos(),
                vel: glam::Vec2::new(vx, vy),
                radius,
            }),
            _ => None,
        }
    }

    /// Write position and velocity back into a ball piece
    pub fn write_to(&self, piece: &mut Piece) {
        piece.set_pos(self.pos);
        if let PieceKind::Ball { vx, vy, .. } = &mut piece.kind {
            *vx = self.vel.x;
            *vy = self.vel.y;
        }
    }
}

/// Advance the ball by `dt` against every non-ball piece
///
/// The tick is split into equal sub-steps no larger than `MAX_SUB_STEP`. Each
/// sub-step applies gravity, integrates position, then resolves pieces in
/// list order. Calling this on a non-ball piece does nothing.
pub fn update_ball<'a>(ball: &'a mut Piece, pieces: &[Piece], dt: f32) -> &'a mut Piece {
    let Some(mut body) = BallBody::from_piece(ball) else {
        return ball;
    };

    let steps = ((dt / MAX_SUB_STEP).ceil() as u32).max(1);
    let step = dt / steps as f32;
    for _ in 0..steps {
        body.vel.y += GRAVITY * step;
        body.pos += body.vel * step;

        for piece in pieces.iter().filter(|p| !p.is_ball()) {
            resolve_piece(&mut body, piece);
        }
    }

    body.write_to(ball);
    ball
}

/// Outcome of a headless run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimOutcome {
    /// Ball reached the target after this many ticks
    Completed { ticks: u32 },
    /// Tick budget ran out
    TimedOut,
    /// Ball left the board
    OutOfBounds { ticks: u32 },
    /// Puzzle has no ball
    NoBall,
}

impl PuzzleState {
    /// Advance the puzzle's ball by one tick
    pub fn step_ball(&mut self, dt: f32) {
        let Some(idx) = self.pieces.iter().position(|p| p.is_ball()) else {
            return;
        };
        let mut ball = self.pieces[idx].clone();
        update_ball(&mut ball, &self.pieces, dt);
        self.pieces[idx] = ball;
    }
}

/// Run the puzzle without player input until it completes or `max_ticks` pass
pub fn simulate(mut puzzle: PuzzleState, max_ticks: u32) -> SimOutcome {
    if puzzle.ball().is_none() {
        return SimOutcome::NoBall;
    }
    for tick in 1..=max_ticks {
        puzzle.step_ball(1.0);
        if puzzle.is_complete() {
            return SimOutcome::Completed { ticks: tick };
        }
        let escaped = puzzle.ball().is_some_and(|ball| {
            ball.y > BOARD_HEIGHT * 2.0 || ball.x < -BOARD_WIDTH || ball.x > BOARD_WIDTH * 2.0
        });
        if escaped {
            return SimOutcome::OutOfBounds { ticks: tick };
        }
    }
    SimOutcome::TimedOut
}

#[cfg(test)]
mod tests {
    use glam::Vec2;

    use super::*;
    use crate::sim::state::{Point, RampDirection};

    fn ball(x: f32, y: f32, vx: f32, vy: f32) -> Piece {
        Piece::new(
            "ball",
            Vec2::new(x, y),
            PieceKind::Ball {
                vx,
                vy,
                radius: 5.0,
            },
        )
    }

    fn velocity(piece: &Piece) -> Vec2 {
        BallBody::from_piece(piece).unwrap().vel
    }

    #[test]
    fn test_gravity_increases_vy() {
        let mut b = ball(50.0, 40.0, 10.0, 0.0);
        update_ball(&mut b, &[], 1.0);
        assert!(velocity(&b).y > 0.0);
        assert!(b.x > 50.0);
    }

    #[test]
    fn test_substep_count() {
        // Four sub-steps of 0.25 accumulate exactly one unit of gravity
        let mut b = ball(0.0, 0.0, 0.0, 0.0);
        update_ball(&mut b, &[], 1.0);
        assert!((velocity(&b).y - GRAVITY).abs() < 1e-6);
        // y = 0.5 * (0.125 + 0.25 + 0.375 + 0.5) * 0.25
        assert!((b.y - 0.3125).abs() < 1e-6);
    }

    #[test]
    fn test_ball_rests_on_block() {
        let block = Piece::new("b", Vec2::new(60.0, 50.0), PieceKind::Block).with_static(true);
        let mut b = ball(60.0, 39.0, 0.0, 0.0);
        for _ in 0..2 {
            update_ball(&mut b, std::slice::from_ref(&block), 1.0);
        }
        assert!(b.y <= 35.001);
        assert!(b.y >= 35.0 - 0.001);
    }

    #[test]
    fn test_falling_ball_does_not_sink() {
        let block = Piece::new("b", Vec2::new(100.0, 200.0), PieceKind::Block).with_static(true);
        let mut b = ball(100.0, 120.0, 0.0, 0.0);
        for _ in 0..60 {
            update_ball(&mut b, std::slice::from_ref(&block), 1.0);
            assert!(b.y <= 200.0 - 10.0 - 5.0 + 0.5);
        }
        assert!((b.y - 185.0).abs() < 0.5);
    }

    #[test]
    fn test_ramp_deflects_falling_ball() {
        let ramp = Piece::new(
            "r1",
            Vec2::new(60.0, 60.0),
            PieceKind::Ramp {
                direction: RampDirection::Right,
            },
        );
        let mut b = ball(60.0, 50.0, 0.0, 2.0);
        for _ in 0..2 {
            update_ball(&mut b, std::slice::from_ref(&ramp), 1.0);
        }
        // Sent down the slope instead of passing through
        assert!(velocity(&b).x < 0.0);
        assert!(b.y < 60.0);
    }

    #[test]
    fn test_spring_launch() {
        let spring = Piece::new("s1", Vec2::new(60.0, 60.0), PieceKind::Spring { power: 8.0 });
        let mut b = ball(60.0, 59.0, 0.0, 1.0);
        update_ball(&mut b, std::slice::from_ref(&spring), 1.0);
        assert_eq!(velocity(&b).y, -8.0);
    }

    #[test]
    fn test_fan_lifts() {
        let fan = Piece::new("f1", Vec2::new(60.0, 60.0), PieceKind::Fan { power: 1.0 });
        let mut b = ball(60.0, 60.0, 0.0, 0.0);
        update_ball(&mut b, std::slice::from_ref(&fan), 1.0);
        assert!(velocity(&b).y < 0.0);
    }

    #[test]
    fn test_non_ball_untouched() {
        let mut block = Piece::new("b", Vec2::new(5.0, 5.0), PieceKind::Block);
        let before = block.clone();
        update_ball(&mut block, &[], 1.0);
        assert_eq!(block, before);
    }

    #[test]
    fn test_simulate_drop_onto_target() {
        let puzzle = PuzzleState {
            seed: "drop".into(),
            difficulty: 1,
            pieces: vec![ball(100.0, 50.0, 0.0, 0.0)],
            target: Point::new(100.0, 150.0),
            solution: None,
        };
        assert!(matches!(simulate(puzzle, 200), SimOutcome::Completed { .. }));
    }

    #[test]
    fn test_simulate_without_ball() {
        let puzzle = PuzzleState {
            seed: "empty".into(),
            difficulty: 1,
            pieces: vec![],
            target: Point::new(100.0, 150.0),
            solution: None,
        };
        assert_eq!(simulate(puzzle, 10), SimOutcome::NoBall);
    }
}
