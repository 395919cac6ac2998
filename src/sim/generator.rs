//! Procedural puzzle generation
//!
//! Three phases share one RNG stream, so the order of draws is part of the
//! output: golden path, scattered pieces, then barrier walls.

use glam::Vec2;

use super::rng::{PuzzleRng, create_rng};
use super::state::{Piece, PieceKind, PuzzleState, RampDirection, Target};
use crate::consts::*;

/// Bookkeeping from a generation run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlacementStats {
    /// Positions accepted without the spacing check
    pub fallbacks: u32,
    /// Golden path blocks between ball and target
    pub path_blocks: u32,
}

/// Piece types drawn during the scatter phase
#[derive(Debug, Clone, Copy)]
enum Scatter {
    Block,
    Ramp,
    Fan,
    Spring,
    Wall,
}

impl Scatter {
    const ALL: [Scatter; 5] = [
        Scatter::Block,
        Scatter::Ramp,
        Scatter::Fan,
        Scatter::Spring,
        Scatter::Wall,
    ];
}

/// Rejection-sampled placement against everything placed so far
struct Placer {
    rng: PuzzleRng,
    placed: Vec<Vec2>,
    stats: PlacementStats,
}

impl Placer {
    fn candidate(&mut self) -> Vec2 {
        let x = self.rng.range(BOARD_MARGIN, BOARD_WIDTH - BOARD_MARGIN);
        let y = self.rng.range(BOARD_MARGIN, BOARD_HEIGHT - BOARD_MARGIN);
        Vec2::new(x, y)
    }

    fn is_clear(&self, pos: Vec2) -> bool {
        self.placed.iter().all(|p| p.distance(pos) >= MIN_DISTANCE)
    }

    /// Find a spaced-out position; after the attempt budget the next
    /// candidate is taken unchecked so generation always terminates.
    fn random_position(&mut self) -> Vec2 {
        for _ in 0..MAX_PLACEMENT_ATTEMPTS {
            let pos = self.candidate();
            if self.is_clear(pos) {
                return pos;
            }
        }
        self.stats.fallbacks += 1;
        self.candidate()
    }

    fn place(&mut self) -> Vec2 {
        let pos = self.random_position();
        self.placed.push(pos);
        pos
    }
}

/// Build a solvable puzzle for `difficulty` (clamped to at least 1)
pub fn generate_puzzle(difficulty: u32, seed: &str) -> PuzzleState {
    generate_puzzle_with_stats(difficulty, seed).0
}

/// [`generate_puzzle`], also reporting how placement went
pub fn generate_puzzle_with_stats(difficulty: u32, seed: &str) -> (PuzzleState, PlacementStats) {
    let difficulty = difficulty.max(1);
    let mut counter = 0u32;
    let mut next_id = || {
        let id = format!("{seed}-{counter}");
        counter += 1;
        id
    };

    let mut placer = Placer {
        rng: create_rng(seed),
        placed: Vec::new(),
        stats: PlacementStats::default(),
    };
    let mut pieces = Vec::new();

    // Phase 1: golden path
    let spawn = Vec2::splat(BOARD_MARGIN + BALL_SPAWN_OFFSET);
    pieces.push(Piece::new(next_id(), spawn, PieceKind::ball()));
    placer.placed.push(spawn);

    let target = placer.place();

    let path_len = spawn.distance(target);
    let max_steps = (path_len / MIN_DISTANCE).floor() as i64 - 1;
    let steps = (difficulty as i64 + 2).min(max_steps).max(1) as u32;
    for i in 1..=steps {
        let t = i as f32 / (steps + 1) as f32;
        let pos = spawn.lerp(target, t);
        pieces.push(Piece::new(next_id(), pos, PieceKind::Block).with_static(true));
        placer.placed.push(pos);
    }
    placer.stats.path_blocks = steps;

    // Phase 2: scattered pieces of random type
    for _ in 0..difficulty + 2 {
        let pos = placer.place();
        let kind = match *placer.rng.pick(&Scatter::ALL) {
            Scatter::Block => PieceKind::Block,
            Scatter::Ramp => PieceKind::Ramp {
                direction: if placer.rng.chance(0.5) {
                    RampDirection::Left
                } else {
                    RampDirection::Right
                },
            },
            Scatter::Fan => PieceKind::Fan { power: FAN_POWER },
            Scatter::Spring => PieceKind::Spring {
                power: SPRING_POWER,
            },
            Scatter::Wall => PieceKind::wall(),
        };
        let is_static = matches!(kind, PieceKind::Block | PieceKind::Wall { .. });
        pieces.push(Piece::new(next_id(), pos, kind).with_static(is_static));
    }

    // Phase 3: barrier walls
    for _ in 0..difficulty / 2 {
        let pos = placer.place();
        pieces.push(Piece::new(next_id(), pos, PieceKind::wall()).with_static(true));
    }

    if placer.stats.fallbacks > 0 {
        log::debug!(
            "Puzzle {} (difficulty {}): {} unchecked placements",
            seed,
            difficulty,
            placer.stats.fallbacks
        );
    }

    let puzzle = PuzzleState {
        seed: seed.to_string(),
        difficulty,
        pieces,
        target: Target::from(target),
        solution: None,
    };
    (puzzle, placer.stats)
}
