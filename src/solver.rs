//! Puzzle solver: route finding and difficulty scoring
//!
//! Runs off the session actor on a blocking worker so message handling never
//! waits on it. Results are cached by seed.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, VecDeque};

use glam::Vec2;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::consts::*;
use crate::sim::{PieceKind, Point, PuzzleState, SimOutcome, simulate};

/// Grid resolution for route search (pixels per cell)
pub const GRID_CELL: f32 = 20.0;
/// Tick budget for the unaided drop check
pub const UNAIDED_TICKS: u32 = 600;
/// Scores are capped here
pub const MAX_SCORE: u32 = 100;
/// Solutions kept by [`SolverCache`]
pub const MAX_CACHED_SOLUTIONS: usize = 32;

const COLS: i32 = (BOARD_WIDTH / GRID_CELL) as i32;
const ROWS: i32 = (BOARD_HEIGHT / GRID_CELL) as i32;
const STRAIGHT_COST: u32 = 10;
const DIAGONAL_COST: u32 = 14;

/// Solver annotation attached to a published puzzle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Solution {
    /// Ball origin, waypoints, target (always at least two points)
    pub solution_path: Vec<Point>,
    pub difficulty_score: u32,
    /// Ball reaches the target without any player action
    #[serde(default)]
    pub unaided: bool,
}

#[derive(Debug, Error)]
pub enum SolveError {
    #[error("puzzle {0} has no ball")]
    NoBall(String),
    #[error("solver worker failed: {0}")]
    Worker(String),
}

/// Solutions keyed by puzzle seed, oldest evicted first once full
#[derive(Debug, Default)]
pub struct SolverCache {
    entries: HashMap<String, Solution>,
    order: VecDeque<String>,
}

impl SolverCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, seed: &str) -> Option<&Solution> {
        self.entries.get(seed)
    }

    pub fn insert(&mut self, seed: impl Into<String>, solution: Solution) {
        let seed = seed.into();
        if self.entries.insert(seed.clone(), solution).is_none() {
            self.order.push_back(seed);
        }
        while self.order.len() > MAX_CACHED_SOLUTIONS {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }
}

type Cell = (i32, i32);

fn cell_of(p: Vec2) -> Cell {
    (
        ((p.x / GRID_CELL).floor() as i32).clamp(0, COLS - 1),
        ((p.y / GRID_CELL).floor() as i32).clamp(0, ROWS - 1),
    )
}

fn cell_center((c, r): Cell) -> Vec2 {
    Vec2::new(
        c as f32 * GRID_CELL + GRID_CELL / 2.0,
        r as f32 * GRID_CELL + GRID_CELL / 2.0,
    )
}

/// Octile distance in cost units
fn heuristic(a: Cell, b: Cell) -> u32 {
    let dx = (a.0 - b.0).unsigned_abs();
    let dy = (a.1 - b.1).unsigned_abs();
    STRAIGHT_COST * dx.max(dy) + (DIAGONAL_COST - STRAIGHT_COST) * dx.min(dy)
}

/// Cells covered by solid pieces, inflated by the ball radius
fn blocked_cells(puzzle: &PuzzleState, radius: f32) -> Vec<bool> {
    let mut blocked = vec![false; (COLS * ROWS) as usize];
    let solids: Vec<_> = puzzle
        .pieces
        .iter()
        .filter(|p| matches!(p.kind, PieceKind::Block | PieceKind::Wall { .. }))
        .map(|p| (p.pos(), p.half_extents() + Vec2::splat(radius)))
        .collect();
    for r in 0..ROWS {
        for c in 0..COLS {
            let center = cell_center((c, r));
            blocked[(r * COLS + c) as usize] = solids
                .iter()
                .any(|(pos, half)| (center - *pos).abs().cmple(*half).all());
        }
    }
    blocked
}

/// A* over the board grid; `None` when the goal is walled off
fn find_route(start: Cell, goal: Cell, blocked: &[bool]) -> Option<Vec<Cell>> {
    let index = |(c, r): Cell| (r * COLS + c) as usize;
    let mut best = vec![u32::MAX; blocked.len()];
    let mut came_from: Vec<Option<Cell>> = vec![None; blocked.len()];
    let mut open = BinaryHeap::new();

    best[index(start)] = 0;
    open.push(Reverse((heuristic(start, goal), 0u32, start)));

    while let Some(Reverse((_, cost, cell))) = open.pop() {
        if cell == goal {
            let mut route = vec![cell];
            let mut cur = cell;
            while let Some(prev) = came_from[index(cur)] {
                route.push(prev);
                cur = prev;
            }
            route.reverse();
            return Some(route);
        }
        if cost > best[index(cell)] {
            continue;
        }
        for dc in -1..=1 {
            for dr in -1..=1 {
                if dc == 0 && dr == 0 {
                    continue;
                }
                let next = (cell.0 + dc, cell.1 + dr);
                if next.0 < 0 || next.0 >= COLS || next.1 < 0 || next.1 >= ROWS {
                    continue;
                }
                if blocked[index(next)] && next != goal {
                    continue;
                }
                let step = if dc != 0 && dr != 0 {
                    DIAGONAL_COST
                } else {
                    STRAIGHT_COST
                };
                let next_cost = cost + step;
                if next_cost < best[index(next)] {
                    best[index(next)] = next_cost;
                    came_from[index(next)] = Some(cell);
                    open.push(Reverse((next_cost + heuristic(next, goal), next_cost, next)));
                }
            }
        }
    }
    None
}

/// Keep only the cells where the route changes direction
fn corners(route: &[Cell]) -> Vec<Cell> {
    route
        .windows(3)
        .filter(|w| (w[1].0 - w[0].0, w[1].1 - w[0].1) != (w[2].0 - w[1].0, w[2].1 - w[1].1))
        .map(|w| w[1])
        .collect()
}

fn path_length(path: &[Point]) -> f32 {
    path.windows(2)
        .map(|w| Vec2::from(w[0]).distance(Vec2::from(w[1])))
        .sum()
}

/// Any monotonic function of route length and piece count, capped at 100
pub fn difficulty_score(path: &[Point], piece_count: usize) -> u32 {
    let raw = (path_length(path) / 10.0 + piece_count as f32).round() as u32;
    raw.min(MAX_SCORE)
}

/// Route the ball to the target and rate the puzzle
pub fn solve_puzzle(puzzle: &PuzzleState) -> Result<Solution, SolveError> {
    let ball = puzzle
        .ball()
        .ok_or_else(|| SolveError::NoBall(puzzle.seed.clone()))?;
    let radius = match ball.kind {
        PieceKind::Ball { radius, .. } => radius,
        _ => BALL_RADIUS,
    };
    let origin = ball.pos();
    let target: Vec2 = puzzle.target.into();

    let start = cell_of(origin);
    let goal = cell_of(target);
    let mut blocked = blocked_cells(puzzle, radius);
    blocked[(start.1 * COLS + start.0) as usize] = false;

    let mut solution_path = vec![Point::from(origin)];
    match find_route(start, goal, &blocked) {
        Some(route) => {
            solution_path.extend(corners(&route).into_iter().map(|c| Point::from(cell_center(c))));
        }
        None => log::debug!("No grid route for puzzle {}, using straight line", puzzle.seed),
    }
    solution_path.push(puzzle.target);

    let unaided = matches!(
        simulate(puzzle.clone(), UNAIDED_TICKS),
        SimOutcome::Completed { .. }
    );
    let difficulty_score = difficulty_score(&solution_path, puzzle.pieces.len());
    Ok(Solution {
        solution_path,
        difficulty_score,
        unaided,
    })
}

/// Solve on a blocking worker thread
pub fn spawn_solver(puzzle: PuzzleState) -> JoinHandle<Result<Solution, SolveError>> {
    tokio::task::spawn_blocking(move || solve_puzzle(&puzzle))
}

/// Solve in the background, folding worker panics into [`SolveError`]
pub async fn solve_in_background(puzzle: PuzzleState) -> Result<Solution, SolveError> {
    spawn_solver(puzzle)
        .await
        .map_err(|e| SolveError::Worker(e.to_string()))?
}
