//! Collision detection and response against puzzle pieces
//!
//! Only two solid shapes exist: axis-aligned boxes (blocks, walls) and 45°
//! ramps. Fans and springs are non-solid force fields.

use std::f32::consts::FRAC_1_SQRT_2;

use glam::Vec2;

use super::state::{Piece, RampDirection};
use crate::consts::*;

/// Working copy of the ball used during integration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BallBody {
    pub pos: Vec2,
    pub vel: Vec2,
    pub radius: f32,
}

/// Result of a collision check
#[derive(Debug, Clone)]
pub struct CollisionResult {
    /// Whether a collision occurred
    pub hit: bool,
    /// Surface normal at the contact, pointing into the obstacle
    pub normal: Vec2,
    /// Penetration depth along the normal
    pub penetration: f32,
}

impl CollisionResult {
    pub fn miss() -> Self {
        Self {
            hit: false,
            normal: Vec2::ZERO,
            penetration: 0.0,
        }
    }
}

/// Reflect velocity off a surface
///
/// Standard reflection: v' = v - 2(v·n)n
#[inline]
pub fn reflect_velocity(velocity: Vec2, normal: Vec2) -> Vec2 {
    velocity - 2.0 * velocity.dot(normal) * normal
}

/// Circle vs axis-aligned box, resolved along the axis of least penetration
///
/// The ball lands just outside the box face. Velocity on the colliding axis
/// points away from the box with the magnitude of the contact offset (zero
/// for static boxes), then loses half of it. The other axis is cleared.
pub fn resolve_box(ball: &mut BallBody, center: Vec2, half: Vec2, is_static: bool) -> bool {
    let min = center - half;
    let max = center + half;
    let nearest = ball.pos.clamp(min, max);
    let d = ball.pos - nearest;
    if d.length_squared() >= ball.radius * ball.radius {
        return false;
    }

    let bounce = |offset: f32| if is_static { 0.0 } else { offset.abs() };
    if d.x.abs() > d.y.abs() {
        if d.x > 0.0 {
            ball.pos.x = max.x + ball.radius;
            ball.vel = Vec2::new(bounce(d.x), 0.0);
        } else {
            ball.pos.x = min.x - ball.radius;
            ball.vel = Vec2::new(-bounce(d.x), 0.0);
        }
    } else if d.y > 0.0 {
        ball.pos.y = max.y + ball.radius;
        ball.vel = Vec2::new(0.0, bounce(d.y));
    } else {
        ball.pos.y = min.y - ball.radius;
        ball.vel = Vec2::new(0.0, -bounce(d.y));
    }
    ball.vel *= RESTITUTION;
    true
}

/// Check the ball against a ramp's 45° surface
///
/// The surface passes through the ramp center; `right` rises to the right
/// (from (-10, +10) to (+10, -10) in screen space), `left` is mirrored. Solid
/// material sits below the surface.
pub fn ball_ramp_collision(ball: &BallBody, center: Vec2, direction: RampDirection) -> CollisionResult {
    let local = ball.pos - center;
    if local.x.abs() > RAMP_REACH || local.y.abs() > RAMP_REACH {
        return CollisionResult::miss();
    }

    let normal = match direction {
        RampDirection::Right => Vec2::new(FRAC_1_SQRT_2, FRAC_1_SQRT_2),
        RampDirection::Left => Vec2::new(-FRAC_1_SQRT_2, FRAC_1_SQRT_2),
    };
    // Signed distance from the surface, positive below it
    let depth = local.dot(normal);
    if depth <= -ball.radius {
        return CollisionResult::miss();
    }
    CollisionResult {
        hit: true,
        normal,
        penetration: depth + ball.radius,
    }
}

/// Push the ball out of a ramp and bounce it inelastically
pub fn resolve_ramp(ball: &mut BallBody, center: Vec2, direction: RampDirection) -> bool {
    let hit = ball_ramp_collision(ball, center, direction);
    if !hit.hit {
        return false;
    }
    ball.pos -= hit.normal * hit.penetration;
    if ball.vel.dot(hit.normal) > 0.0 {
        ball.vel = reflect_velocity(ball.vel, hit.normal) * RESTITUTION;
    }
    true
}

/// Continuous upward thrust while inside the fan's range
pub fn apply_fan(ball: &mut BallBody, center: Vec2, power: f32) -> bool {
    if ball.pos.distance_squared(center) < FAN_RANGE * FAN_RANGE {
        ball.vel.y -= 2.0 * power;
        return true;
    }
    false
}

/// Launch the ball upward at exactly `power` unless it already rises faster
pub fn apply_spring(ball: &mut BallBody, center: Vec2, power: f32) -> bool {
    let reach = ball.radius + SPRING_RANGE;
    if ball.pos.distance_squared(center) < reach * reach && ball.vel.y > -power {
        ball.vel.y = -power;
        return true;
    }
    false
}

/// Apply a single piece to the ball. Returns true if the ball was affected.
pub fn resolve_piece(ball: &mut BallBody, piece: &Piece) -> bool {
    use super::state::PieceKind;

    match piece.kind {
        PieceKind::Block | PieceKind::Wall { .. } => {
            resolve_box(ball, piece.pos(), piece.half_extents(), piece.is_static)
        }
        PieceKind::Ramp { direction } => resolve_ramp(ball, piece.pos(), direction),
        PieceKind::Fan { power } => apply_fan(ball, piece.pos(), power),
        PieceKind::Spring { power } => apply_spring(ball, piece.pos(), power),
        PieceKind::Ball { .. } => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ball_at(x: f32, y: f32, vx: f32, vy: f32) -> BallBody {
        BallBody {
            pos: Vec2::new(x, y),
            vel: Vec2::new(vx, vy),
            radius: 5.0,
        }
    }

    #[test]
    fn test_box_pushes_out_of_top_face() {
        let mut ball = ball_at(60.0, 37.0, 0.0, 3.0);
        assert!(resolve_box(&mut ball, Vec2::new(60.0, 50.0), Vec2::splat(10.0), true));
        assert_eq!(ball.pos.y, 35.0);
        assert_eq!(ball.vel, Vec2::ZERO);
    }

    #[test]
    fn test_box_side_hit_dynamic_bounces() {
        let mut ball = ball_at(73.0, 50.0, -4.0, 1.0);
        assert!(resolve_box(&mut ball, Vec2::new(60.0, 50.0), Vec2::splat(10.0), false));
        assert_eq!(ball.pos.x, 75.0);
        // Offset of 3 from the face, halved
        assert!((ball.vel.x - 1.5).abs() < 1e-6);
        assert_eq!(ball.vel.y, 0.0);
    }

    #[test]
    fn test_box_miss() {
        let mut ball = ball_at(60.0, 30.0, 0.0, 1.0);
        assert!(!resolve_box(&mut ball, Vec2::new(60.0, 50.0), Vec2::splat(10.0), true));
        assert_eq!(ball.pos, Vec2::new(60.0, 30.0));
    }

    #[test]
    fn test_ramp_bounce_moving_down() {
        let mut ball = ball_at(60.0, 56.0, 0.0, 3.0);
        assert!(resolve_ramp(&mut ball, Vec2::new(60.0, 60.0), RampDirection::Right));
        assert!(ball.vel.y <= 0.0);
        // Deflected toward the low side of the incline
        assert!(ball.vel.x < 0.0);
        let after = ball_ramp_collision(&ball, Vec2::new(60.0, 60.0), RampDirection::Right);
        assert!(after.penetration.abs() < 1e-4);
    }

    #[test]
    fn test_left_ramp_mirrors() {
        let mut ball = ball_at(60.0, 56.0, 0.0, 3.0);
        assert!(resolve_ramp(&mut ball, Vec2::new(60.0, 60.0), RampDirection::Left));
        assert!(ball.vel.y <= 0.0);
        assert!(ball.vel.x > 0.0);
    }

    #[test]
    fn test_ramp_outside_reach() {
        let ball = ball_at(80.0, 60.0, 0.0, 3.0);
        assert!(!ball_ramp_collision(&ball, Vec2::new(60.0, 60.0), RampDirection::Right).hit);
    }

    #[test]
    fn test_fan_thrust() {
        let mut ball = ball_at(0.0, 30.0, 0.0, 1.0);
        assert!(apply_fan(&mut ball, Vec2::ZERO, 1.0));
        assert_eq!(ball.vel.y, -1.0);
        let mut far = ball_at(0.0, 45.0, 0.0, 1.0);
        assert!(!apply_fan(&mut far, Vec2::ZERO, 1.0));
    }

    #[test]
    fn test_spring_not_cumulative() {
        let mut ball = ball_at(0.0, 5.0, 0.0, 2.0);
        assert!(apply_spring(&mut ball, Vec2::ZERO, 8.0));
        assert_eq!(ball.vel.y, -8.0);
        // Already rising fast enough, untouched
        ball.vel.y = -10.0;
        assert!(!apply_spring(&mut ball, Vec2::ZERO, 8.0));
        assert_eq!(ball.vel.y, -10.0);
    }

    #[test]
    fn test_reflect_velocity() {
        let velocity = Vec2::new(100.0, 0.0);
        let normal = Vec2::new(-1.0, 0.0);

        let reflected = reflect_velocity(velocity, normal);
        assert!((reflected.x - (-100.0)).abs() < 0.001);
        assert!(reflected.y.abs() < 0.001);
    }
}
