//! WebSocket server
//!
//! One actor task owns the [`Session`] and handles commands in order. Each
//! connection gets a reader task that parses frames and forwards them to the
//! actor, and a writer task fed by a bounded outbox the actor holds. A
//! connection that lets its outbox fill up is dropped.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::net::SocketAddr;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

use crate::error::Result;
use crate::now_millis;
use crate::persistence::{Snapshot, SnapshotWriter};
use crate::settings::ServerSettings;
use crate::sim::ClientId;
use crate::solver::{SolveError, Solution, solve_in_background};

use super::protocol::ClientMessage;
use super::session::{ConnId, Outbound, Session};

/// Queued commands before readers start waiting on the actor
const COMMAND_BUFFER: usize = 1024;
/// Unsent frames a connection may lag behind before it is dropped
const OUTBOX_CAPACITY: usize = 256;

enum SessionCommand {
    Connect {
        conn: ConnId,
        client: ClientId,
        outbox: mpsc::Sender<Message>,
    },
    Message {
        conn: ConnId,
        msg: ClientMessage,
    },
    Disconnect {
        conn: ConnId,
    },
    Solved {
        seed: String,
        result: std::result::Result<Solution, SolveError>,
    },
    Shutdown,
}

/// Owns the session and every connection's outbox
struct SessionActor {
    session: Session,
    outboxes: HashMap<ConnId, mpsc::Sender<Message>>,
    commands: mpsc::Sender<SessionCommand>,
    solver: Option<JoinHandle<()>>,
    writer: Option<SnapshotWriter>,
}

impl SessionActor {
    fn new(
        session: Session,
        writer: Option<SnapshotWriter>,
        commands: mpsc::Sender<SessionCommand>,
    ) -> Self {
        Self {
            session,
            outboxes: HashMap::new(),
            commands,
            solver: None,
            writer,
        }
    }

    async fn run(mut self, mut rx: mpsc::Receiver<SessionCommand>) {
        // Effects queued while building the session (first solve, first save)
        self.apply_effects();

        while let Some(cmd) = rx.recv().await {
            if !self.dispatch(cmd) {
                break;
            }
        }

        if let Some(solver) = self.solver.take() {
            solver.abort();
        }
        if let Some(writer) = self.writer.take() {
            writer.submit(self.session.snapshot());
            writer.shutdown().await;
        }
        log::info!("Session stopped");
    }

    /// Handle one command; false once the actor should stop
    fn dispatch(&mut self, cmd: SessionCommand) -> bool {
        let out = match cmd {
            SessionCommand::Connect { conn, client, outbox } => {
                self.outboxes.insert(conn, outbox);
                self.session.connect(conn, client)
            }
            SessionCommand::Message { conn, msg } => self.session.handle(conn, msg, now_millis()),
            SessionCommand::Disconnect { conn } => {
                self.outboxes.remove(&conn);
                self.session.disconnect(conn)
            }
            SessionCommand::Solved { seed, result } => self.session.apply_solution(&seed, result),
            SessionCommand::Shutdown => return false,
        };
        self.deliver(out);
        self.apply_effects();
        true
    }

    /// Fan messages out to their recipients. A connection whose outbox is
    /// full is dropped, and its `playerLeft` goes out with the rest.
    fn deliver(&mut self, out: Vec<Outbound>) {
        let mut pending = VecDeque::from(out);
        while let Some(outbound) = pending.pop_front() {
            let json = match outbound.message().to_json() {
                Ok(json) => json,
                Err(e) => {
                    log::error!("Failed to encode {}: {}", outbound.message().kind(), e);
                    continue;
                }
            };
            for conn in self.session.recipients(&outbound) {
                let Some(outbox) = self.outboxes.get(&conn) else {
                    continue;
                };
                match outbox.try_send(Message::text(json.clone())) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        log::warn!("Connection {} is not keeping up, dropping it", conn);
                        self.outboxes.remove(&conn);
                        pending.extend(self.session.disconnect(conn));
                    }
                    // Writer already gone; the reader reports the disconnect
                    Err(TrySendError::Closed(_)) => {}
                }
            }
        }
    }

    fn apply_effects(&mut self) {
        let effects = self.session.take_effects();
        if effects.persist {
            if let Some(writer) = &self.writer {
                writer.submit(self.session.snapshot());
            }
        }
        if let Some(puzzle) = effects.solve {
            if let Some(previous) = self.solver.take() {
                previous.abort();
            }
            let commands = self.commands.clone();
            let seed = puzzle.seed.clone();
            log::debug!("Solving puzzle {}", seed);
            self.solver = Some(tokio::spawn(async move {
                let result = solve_in_background(puzzle).await;
                let _ = commands.send(SessionCommand::Solved { seed, result }).await;
            }));
        }
    }
}

/// Reader side of one connection; the writer runs in its own task
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    conn: ConnId,
    commands: mpsc::Sender<SessionCommand>,
) {
    let ws = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            log::debug!("WebSocket handshake with {} failed: {}", addr, e);
            return;
        }
    };
    let (mut sink, mut source) = ws.split();
    let (outbox, mut inbox) = mpsc::channel::<Message>(OUTBOX_CAPACITY);

    let client = ClientId::from_addr(&addr);
    if commands
        .send(SessionCommand::Connect { conn, client, outbox })
        .await
        .is_err()
    {
        return;
    }

    let mut writer = tokio::spawn(async move {
        while let Some(msg) = inbox.recv().await {
            if let Err(e) = sink.send(msg).await {
                log::debug!("Send to connection {} failed: {}", conn, e);
                break;
            }
        }
        let _ = sink.close().await;
    });

    // The writer also ends when the actor drops a lagging connection
    let mut writer_done = false;
    loop {
        tokio::select! {
            frame = source.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let Some(msg) = ClientMessage::parse(text.as_str()) else {
                        continue;
                    };
                    if commands.send(SessionCommand::Message { conn, msg }).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    log::debug!("Connection {} read error: {}", conn, e);
                    break;
                }
            },
            _ = &mut writer => {
                writer_done = true;
                break;
            }
        }
    }

    let _ = commands.send(SessionCommand::Disconnect { conn }).await;
    if !writer_done {
        let _ = writer.await;
    }
}

/// Build the session, resuming from the snapshot when one is readable
fn load_session(settings: &ServerSettings) -> Session {
    let now = now_millis();
    let Some(path) = &settings.snapshot_path else {
        return Session::new(settings, now);
    };
    match Snapshot::load(path) {
        Ok(Some(snapshot)) => Session::from_snapshot(snapshot, settings),
        Ok(None) => Session::new(settings, now),
        Err(e) => {
            log::warn!("Ignoring snapshot {}: {}", path.display(), e);
            Session::new(settings, now)
        }
    }
}

/// WebSocket front end for a single shared session
pub struct PuzzleServer {
    listener: TcpListener,
    session: Session,
    settings: ServerSettings,
}

impl PuzzleServer {
    /// Load state and bind the listening socket
    pub async fn bind(settings: ServerSettings) -> Result<Self> {
        let session = load_session(&settings);
        let listener = TcpListener::bind(settings.address()).await?;
        log::info!("Listening on ws://{}", listener.local_addr()?);
        Ok(Self {
            listener,
            session,
            settings,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve forever
    pub async fn run(self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Serve until `shutdown` resolves, then write a final snapshot
    pub async fn run_until(self, shutdown: impl Future<Output = ()>) -> Result<()> {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let writer = self.settings.snapshot_path.clone().map(SnapshotWriter::spawn);
        let actor = SessionActor::new(self.session, writer, tx.clone());
        let actor = tokio::spawn(actor.run(rx));

        let mut next_conn: ConnId = 0;
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    log::info!("Shutting down");
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        next_conn += 1;
                        log::debug!("Connection {} from {}", next_conn, addr);
                        tokio::spawn(handle_connection(stream, addr, next_conn, tx.clone()));
                    }
                    Err(e) => log::warn!("Accept failed: {}", e),
                },
            }
        }

        let _ = tx.send(SessionCommand::Shutdown).await;
        if let Err(e) = actor.await {
            log::error!("Session actor ended abnormally: {}", e);
        }
        Ok(())
    }
}
