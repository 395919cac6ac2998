//! End-to-end tests over a real WebSocket connection

use std::path::PathBuf;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use gravity_garden::ServerSettings;
use gravity_garden::net::{ClientMessage, PuzzleServer, ServerMessage};
use gravity_garden::sim::{ClientId, Piece, PieceKind, PuzzleState};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn test_settings(name: &str) -> ServerSettings {
    let dir = std::env::temp_dir().join(format!("gravity-garden-e2e-{}-{}", std::process::id(), name));
    let _ = std::fs::remove_dir_all(&dir);
    ServerSettings {
        host: "127.0.0.1".into(),
        port: 0,
        snapshot_path: Some(dir.join("snapshot.json")),
        solver_enabled: false,
        seed: Some(99),
        ..ServerSettings::default()
    }
}

async fn connect(addr: std::net::SocketAddr) -> Client {
    let (ws, _) = connect_async(format!("ws://{addr}")).await.unwrap();
    ws
}

async fn recv(ws: &mut Client) -> ServerMessage {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a message")
            .expect("connection closed")
            .unwrap();
        if let Message::Text(text) = frame {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

/// Skip messages until one of the given kind arrives
async fn recv_kind(ws: &mut Client, kind: &str) -> ServerMessage {
    loop {
        let msg = recv(ws).await;
        if msg.kind() == kind {
            return msg;
        }
    }
}

async fn send(ws: &mut Client, msg: &ClientMessage) {
    let json = serde_json::to_string(msg).unwrap();
    ws.send(Message::text(json)).await.unwrap();
}

async fn welcome(ws: &mut Client) -> (ClientId, PuzzleState) {
    match recv_kind(ws, "welcome").await {
        ServerMessage::Welcome { client_id, puzzle, .. } => (client_id, puzzle),
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn test_ball_at_target_advances_puzzle() {
    let server = PuzzleServer::bind(test_settings("complete")).await.unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());

    let mut ws = connect(addr).await;
    let (me, puzzle) = welcome(&mut ws).await;

    let ball = Piece::new("", puzzle.target.into(), PieceKind::ball());
    send(&mut ws, &ClientMessage::AddPiece { piece: ball }).await;

    let ServerMessage::PuzzleComplete {
        client_id,
        seed,
        difficulty,
        ..
    } = recv_kind(&mut ws, "puzzleComplete").await
    else {
        unreachable!()
    };
    assert_eq!(client_id, me);
    assert_eq!(seed, puzzle.seed);
    assert_eq!(difficulty, puzzle.difficulty);

    let ServerMessage::NewPuzzle { puzzle: next } = recv_kind(&mut ws, "newPuzzle").await else {
        unreachable!()
    };
    assert_ne!(next.seed, puzzle.seed);
    assert_eq!(next.difficulty, puzzle.difficulty + 1);

    let ServerMessage::Leaderboard { entries } = recv_kind(&mut ws, "leaderboard").await else {
        unreachable!()
    };
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].client_id, me);
    assert_eq!(entries[0].count, 1);
}

#[tokio::test]
async fn test_pieces_broadcast_to_other_players() {
    let server = PuzzleServer::bind(test_settings("broadcast")).await.unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());

    let mut first = connect(addr).await;
    welcome(&mut first).await;
    let mut second = connect(addr).await;
    welcome(&mut second).await;
    recv_kind(&mut first, "playerJoined").await;

    // Garbage is dropped without closing the connection
    second
        .send(Message::text(r#"{"type":"bogus"}"#.to_string()))
        .await
        .unwrap();

    let block = Piece::new("", glam::Vec2::new(400.0, 300.0), PieceKind::Block);
    send(&mut second, &ClientMessage::AddPiece { piece: block }).await;

    let ServerMessage::PieceAdded { piece } = recv_kind(&mut first, "pieceAdded").await else {
        unreachable!()
    };
    assert_eq!(piece.kind, PieceKind::Block);
    assert!(piece.owner_id.is_some());
    assert!(!piece.id.is_empty());
}

#[tokio::test]
async fn test_restart_resumes_puzzle() {
    let settings = test_settings("restart");
    let snapshot_path: PathBuf = settings.snapshot_path.clone().unwrap();

    let server = PuzzleServer::bind(settings.clone()).await.unwrap();
    let addr = server.local_addr().unwrap();
    let (stop, stopped) = oneshot::channel::<()>();
    let handle = tokio::spawn(server.run_until(async move {
        let _ = stopped.await;
    }));

    let mut ws = connect(addr).await;
    let (_, before) = welcome(&mut ws).await;
    let wall = Piece::new("", glam::Vec2::new(250.0, 350.0), PieceKind::wall());
    send(&mut ws, &ClientMessage::AddPiece { piece: wall }).await;
    recv_kind(&mut ws, "pieceAdded").await;

    stop.send(()).unwrap();
    handle.await.unwrap().unwrap();
    assert!(snapshot_path.exists());

    let server = PuzzleServer::bind(settings).await.unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());
    let mut ws = connect(addr).await;
    let (_, after) = welcome(&mut ws).await;
    assert_eq!(after.seed, before.seed);
    assert_eq!(after.pieces.len(), before.pieces.len() + 1);
}
