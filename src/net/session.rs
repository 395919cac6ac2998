//! Authoritative shared session
//!
//! `Session` is plain state: it turns inbound messages into outbound ones and
//! never touches sockets, so the whole protocol is testable without a network.
//! Side effects the server has to carry out (snapshot writes, solver runs) are
//! collected and drained with [`Session::take_effects`].

use std::collections::BTreeMap;

use glam::Vec2;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

use crate::clamp_to_board;
use crate::leaderboard::Leaderboard;
use crate::persistence::{SNAPSHOT_VERSION, Snapshot};
use crate::settings::ServerSettings;
use crate::sim::{ClientId, Piece, PieceKind, PuzzleState, generate_puzzle};
use crate::solver::{SolveError, Solution, SolverCache};

use super::protocol::{ClientMessage, ServerMessage};

/// Server-assigned id of one WebSocket connection
pub type ConnId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Connecting,
    Active,
    Disconnected,
}

#[derive(Debug, Clone)]
pub struct Connection {
    pub client_id: ClientId,
    pub phase: ConnectionPhase,
}

/// Where an outgoing message goes
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// Every active connection
    Broadcast(ServerMessage),
    /// Every active connection except one
    BroadcastExcept(ConnId, ServerMessage),
    /// A single connection
    Direct(ConnId, ServerMessage),
}

impl Outbound {
    pub fn message(&self) -> &ServerMessage {
        match self {
            Outbound::Broadcast(msg)
            | Outbound::BroadcastExcept(_, msg)
            | Outbound::Direct(_, msg) => msg,
        }
    }
}

/// Work requested by the session since the last drain
#[derive(Debug, Default)]
pub struct SessionEffects {
    /// State changed in a way that should reach the snapshot
    pub persist: bool,
    /// Puzzle waiting for a solver run (replaces any earlier request)
    pub solve: Option<PuzzleState>,
}

pub struct Session {
    puzzle: PuzzleState,
    /// The current puzzle as generated, for `resetLevel`
    level: PuzzleState,
    difficulty: u32,
    leaderboard: Leaderboard,
    connections: BTreeMap<ConnId, Connection>,
    cache: SolverCache,
    rng: Pcg32,
    next_piece_id: u64,
    solver_enabled: bool,
    max_chat_len: usize,
    effects: SessionEffects,
}

fn fresh_seed(rng: &mut Pcg32, current: Option<&str>) -> String {
    loop {
        let seed = format!("{:016x}", rng.random::<u64>());
        if current != Some(seed.as_str()) {
            return seed;
        }
    }
}

impl Session {
    /// Fresh session with a newly generated puzzle
    pub fn new(settings: &ServerSettings, now: u64) -> Self {
        let mut rng = Pcg32::seed_from_u64(settings.seed.unwrap_or_else(rand::random));
        let difficulty = settings.start_difficulty.max(1);
        let seed = fresh_seed(&mut rng, None);
        let mut puzzle = generate_puzzle(difficulty, &seed);
        puzzle.stamp(now);
        log::info!("New session: puzzle {} at difficulty {}", seed, difficulty);

        let mut session = Self {
            level: puzzle.clone(),
            puzzle,
            difficulty,
            leaderboard: Leaderboard::new(),
            connections: BTreeMap::new(),
            cache: SolverCache::new(),
            rng,
            next_piece_id: 0,
            solver_enabled: settings.solver_enabled,
            max_chat_len: settings.max_chat_len,
            effects: SessionEffects::default(),
        };
        session.effects.persist = true;
        session.request_solve();
        session
    }

    /// Resume from a saved snapshot
    pub fn from_snapshot(snapshot: Snapshot, settings: &ServerSettings) -> Self {
        let rng = Pcg32::seed_from_u64(settings.seed.unwrap_or_else(rand::random));
        let level = snapshot
            .level
            .unwrap_or_else(|| snapshot.puzzle_state.clone());
        log::info!(
            "Resumed session: puzzle {} at difficulty {}, {} players known",
            snapshot.puzzle_state.seed,
            snapshot.difficulty,
            snapshot.sessions.len()
        );

        let mut session = Self {
            puzzle: snapshot.puzzle_state,
            level,
            difficulty: snapshot.difficulty.max(1),
            leaderboard: Leaderboard::from_parts(snapshot.sessions, snapshot.progress),
            connections: BTreeMap::new(),
            cache: SolverCache::new(),
            rng,
            next_piece_id: snapshot.next_piece_id,
            solver_enabled: settings.solver_enabled,
            max_chat_len: settings.max_chat_len,
            effects: SessionEffects::default(),
        };
        match session.puzzle.solution.clone() {
            Some(solution) => session.cache.insert(session.puzzle.seed.clone(), solution),
            None => session.request_solve(),
        }
        session
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            version: SNAPSHOT_VERSION,
            sessions: self.leaderboard.handles.clone(),
            puzzle_state: self.puzzle.clone(),
            difficulty: self.difficulty,
            progress: self.leaderboard.progress.clone(),
            level: Some(self.level.clone()),
            next_piece_id: self.next_piece_id,
        }
    }

    pub fn puzzle(&self) -> &PuzzleState {
        &self.puzzle
    }

    pub fn difficulty(&self) -> u32 {
        self.difficulty
    }

    pub fn leaderboard(&self) -> &Leaderboard {
        &self.leaderboard
    }

    pub fn connection(&self, conn: ConnId) -> Option<&Connection> {
        self.connections.get(&conn)
    }

    pub fn active_count(&self) -> usize {
        self.connections
            .values()
            .filter(|c| c.phase == ConnectionPhase::Active)
            .count()
    }

    /// Drain pending side effects
    pub fn take_effects(&mut self) -> SessionEffects {
        std::mem::take(&mut self.effects)
    }

    /// Connections an outbound message is delivered to
    pub fn recipients(&self, out: &Outbound) -> Vec<ConnId> {
        let active = self
            .connections
            .iter()
            .filter(|(_, c)| c.phase == ConnectionPhase::Active)
            .map(|(id, _)| *id);
        match out {
            Outbound::Broadcast(_) => active.collect(),
            Outbound::BroadcastExcept(skip, _) => active.filter(|id| id != skip).collect(),
            Outbound::Direct(id, _) => active.filter(|a| a == id).collect(),
        }
    }

    /// Register a connection and greet it
    pub fn connect(&mut self, conn: ConnId, client: ClientId) -> Vec<Outbound> {
        self.connections.insert(
            conn,
            Connection {
                client_id: client.clone(),
                phase: ConnectionPhase::Connecting,
            },
        );
        let (emoji, assigned) = self.leaderboard.ensure_handle(&client, &mut self.rng);
        if assigned {
            self.effects.persist = true;
        }
        log::info!("Player {} ({}) joined on connection {}", client, emoji, conn);

        let welcome = ServerMessage::Welcome {
            client_id: client.clone(),
            emoji: emoji.clone(),
            difficulty: self.difficulty,
            puzzle: self.puzzle.clone(),
            leaderboard: self.leaderboard.entries(),
        };
        if let Some(c) = self.connections.get_mut(&conn) {
            c.phase = ConnectionPhase::Active;
        }
        vec![
            Outbound::Direct(conn, welcome),
            Outbound::BroadcastExcept(
                conn,
                ServerMessage::PlayerJoined {
                    client_id: client,
                    emoji,
                },
            ),
        ]
    }

    pub fn disconnect(&mut self, conn: ConnId) -> Vec<Outbound> {
        let Some(mut connection) = self.connections.remove(&conn) else {
            return Vec::new();
        };
        connection.phase = ConnectionPhase::Disconnected;
        let emoji = self.leaderboard.handle(&connection.client_id).to_string();
        log::info!("Player {} left (connection {})", connection.client_id, conn);
        vec![Outbound::Broadcast(ServerMessage::PlayerLeft {
            client_id: connection.client_id,
            emoji,
        })]
    }

    /// Apply one inbound message from `conn`
    pub fn handle(&mut self, conn: ConnId, msg: ClientMessage, now: u64) -> Vec<Outbound> {
        let client = match self.connections.get(&conn) {
            Some(c) if c.phase == ConnectionPhase::Active => c.client_id.clone(),
            _ => {
                log::debug!("Message from inactive connection {} dropped", conn);
                return Vec::new();
            }
        };
        if !msg.is_finite() {
            log::debug!("Dropped message with non-finite numbers from {}", client);
            return Vec::new();
        }

        let mut out = Vec::new();
        match msg {
            ClientMessage::AddPiece { piece } => self.add_piece(&client, piece, now, &mut out),
            ClientMessage::MovePiece { id, x, y } => {
                if let Some(piece) = self.owned_piece_mut(&client, &id) {
                    let pos = clamp_to_board(Vec2::new(x, y));
                    piece.set_pos(pos);
                    out.push(Outbound::Broadcast(ServerMessage::PieceMoved {
                        id,
                        x: pos.x,
                        y: pos.y,
                    }));
                }
            }
            ClientMessage::RotatePiece { id } => {
                if let Some(piece) = self.owned_piece_mut(&client, &id) {
                    piece.rotate();
                    let piece = piece.clone();
                    out.push(Outbound::Broadcast(ServerMessage::PieceRotated { piece }));
                }
            }
            ClientMessage::RemovePiece { id } => {
                if self.owned_piece_mut(&client, &id).is_some() {
                    self.puzzle.remove(&id);
                    out.push(Outbound::Broadcast(ServerMessage::PieceRemoved { id }));
                }
            }
            ClientMessage::BallUpdate { x, y, vx, vy } => {
                self.ball_update(&client, Vec2::new(x, y), Vec2::new(vx, vy), now, &mut out)
            }
            ClientMessage::ResetPuzzle => {
                log::info!("{} reset the puzzle", client);
                self.publish_puzzle(self.difficulty, now);
                out.push(self.new_puzzle_message());
            }
            ClientMessage::ResetLevel => {
                log::info!("{} reset the level", client);
                self.puzzle = self.level.clone();
                self.effects.persist = true;
                out.push(self.new_puzzle_message());
            }
            ClientMessage::SetEmoji { emoji } => {
                if self.leaderboard.set_handle(&client, &emoji) {
                    self.effects.persist = true;
                    out.push(Outbound::Broadcast(ServerMessage::EmojiChanged {
                        emoji: self.leaderboard.handle(&client).to_string(),
                        client_id: client,
                    }));
                } else {
                    log::debug!("Rejected handle from {}", client);
                }
            }
            ClientMessage::Chat { text } => {
                let len = text.chars().count();
                if len == 0 || len > self.max_chat_len {
                    log::debug!("Dropped chat from {} ({} chars)", client, len);
                } else {
                    out.push(Outbound::Broadcast(ServerMessage::Chat {
                        emoji: self.leaderboard.handle(&client).to_string(),
                        client_id: client,
                        text,
                    }));
                }
            }
            ClientMessage::Cursor { x, y } => {
                out.push(Outbound::BroadcastExcept(
                    conn,
                    ServerMessage::Cursor {
                        emoji: self.leaderboard.handle(&client).to_string(),
                        client_id: client,
                        x,
                        y,
                    },
                ));
            }
        }
        out
    }

    /// Fold a solver result in. Results for puzzles that are no longer current
    /// only land in the cache.
    pub fn apply_solution(
        &mut self,
        seed: &str,
        result: Result<Solution, SolveError>,
    ) -> Vec<Outbound> {
        let solution = match result {
            Ok(solution) => solution,
            Err(e) => {
                log::warn!("Solver failed for puzzle {}: {}", seed, e);
                return Vec::new();
            }
        };
        self.cache.insert(seed, solution.clone());
        if self.puzzle.seed != seed {
            log::debug!("Stale solver result for {} ignored", seed);
            return Vec::new();
        }

        log::info!(
            "Puzzle {} scored {} (unaided: {})",
            seed,
            solution.difficulty_score,
            solution.unaided
        );
        self.puzzle.solution = Some(solution.clone());
        if self.level.seed == seed {
            self.level.solution = Some(solution.clone());
        }
        self.effects.persist = true;
        vec![Outbound::Broadcast(ServerMessage::PuzzleScored {
            seed: seed.to_string(),
            solution,
        })]
    }

    fn owned_piece_mut(&mut self, client: &ClientId, id: &str) -> Option<&mut Piece> {
        match self.puzzle.find_mut(id) {
            Some(piece) if piece.is_owned_by(client) => Some(piece),
            Some(_) => {
                log::debug!("{} tried to change piece {} it does not own", client, id);
                None
            }
            None => {
                log::debug!("{} referenced unknown piece {}", client, id);
                None
            }
        }
    }

    fn mint_piece_id(&mut self) -> String {
        loop {
            self.next_piece_id += 1;
            let id = format!("u{}", self.next_piece_id);
            if !self.puzzle.contains(&id) {
                return id;
            }
        }
    }

    fn add_piece(&mut self, client: &ClientId, mut piece: Piece, now: u64, out: &mut Vec<Outbound>) {
        // Ids are never reused, so client-chosen ids are always replaced
        piece.id = self.mint_piece_id();
        piece.set_pos(clamp_to_board(piece.pos()));
        piece.owner_id = Some(client.clone());
        piece.spawn_time = now;
        let is_ball = piece.is_ball();
        log::debug!("{} placed {} {}", client, piece.kind.name(), piece.id);

        self.puzzle.insert(piece.clone());
        self.effects.persist = true;
        out.push(Outbound::Broadcast(ServerMessage::PieceAdded { piece }));
        if is_ball {
            self.check_complete(client, now, out);
        }
    }

    /// Mirror a client-simulated ball, creating one if the board has none
    fn ball_update(&mut self, client: &ClientId, pos: Vec2, vel: Vec2, now: u64, out: &mut Vec<Outbound>) {
        if self.puzzle.ball().is_none() {
            let id = self.mint_piece_id();
            let mut ball = Piece::new(id, pos, PieceKind::ball());
            ball.owner_id = Some(client.clone());
            ball.spawn_time = now;
            self.puzzle.insert(ball);
        }
        let Some(ball) = self.puzzle.ball_mut() else {
            return;
        };
        ball.set_pos(pos);
        if let PieceKind::Ball { vx, vy, .. } = &mut ball.kind {
            *vx = vel.x;
            *vy = vel.y;
        }
        let piece = ball.clone();
        out.push(Outbound::Broadcast(ServerMessage::BallUpdate {
            client_id: client.clone(),
            piece,
        }));
        self.check_complete(client, now, out);
    }

    fn check_complete(&mut self, client: &ClientId, now: u64, out: &mut Vec<Outbound>) {
        if !self.puzzle.is_complete() {
            return;
        }
        let emoji = self.leaderboard.handle(client).to_string();
        let total = self.leaderboard.record_completion(client);
        log::info!(
            "{} ({}) completed puzzle {} at difficulty {} ({} total)",
            client,
            emoji,
            self.puzzle.seed,
            self.difficulty,
            total
        );
        out.push(Outbound::Broadcast(ServerMessage::PuzzleComplete {
            client_id: client.clone(),
            emoji,
            seed: self.puzzle.seed.clone(),
            difficulty: self.difficulty,
        }));

        self.difficulty += 1;
        self.publish_puzzle(self.difficulty, now);
        out.push(self.new_puzzle_message());
        out.push(Outbound::Broadcast(ServerMessage::Leaderboard {
            entries: self.leaderboard.entries(),
        }));
    }

    /// Replace the puzzle with a freshly generated one under a new seed
    fn publish_puzzle(&mut self, difficulty: u32, now: u64) {
        let seed = fresh_seed(&mut self.rng, Some(self.puzzle.seed.as_str()));
        let mut puzzle = generate_puzzle(difficulty, &seed);
        puzzle.stamp(now);
        log::info!("Published puzzle {} at difficulty {}", seed, difficulty);
        self.puzzle = puzzle;
        self.level = self.puzzle.clone();
        self.effects.persist = true;
        self.request_solve();
    }

    fn request_solve(&mut self) {
        if !self.solver_enabled {
            return;
        }
        if let Some(solution) = self.cache.get(&self.puzzle.seed) {
            self.puzzle.solution = Some(solution.clone());
            self.level.solution = Some(solution.clone());
            return;
        }
        self.effects.solve = Some(self.puzzle.clone());
    }

    fn new_puzzle_message(&self) -> Outbound {
        Outbound::Broadcast(ServerMessage::NewPuzzle {
            puzzle: self.puzzle.clone(),
        })
    }
}
