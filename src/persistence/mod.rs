//! Session snapshot persistence
//!
//! Features:
//! - Versioned JSON document
//! - Write to a temp file, then rename over the old snapshot
//! - Background writer that coalesces bursts of changes
//!
//! Writes are best-effort: a failed write is logged and the server keeps
//! running on its in-memory state.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::sim::{ClientId, PuzzleState};

/// Current snapshot format version
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed snapshot: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Unsupported snapshot version {0}")]
    Version(u32),
}

/// Everything needed to resume the same puzzle and progress after a restart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub version: u32,
    /// address -> display handle
    pub sessions: BTreeMap<ClientId, String>,
    pub puzzle_state: PuzzleState,
    pub difficulty: u32,
    /// address -> puzzles completed
    pub progress: BTreeMap<ClientId, u32>,
    /// Puzzle as generated, restored by `resetLevel`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<PuzzleState>,
    /// Next id for player-placed pieces
    #[serde(default)]
    pub next_piece_id: u64,
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

impl Snapshot {
    /// Read a snapshot. `Ok(None)` when no snapshot exists yet.
    pub fn load(path: impl AsRef<Path>) -> Result<Option<Self>, SnapshotError> {
        let json = match std::fs::read_to_string(path.as_ref()) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let snapshot: Snapshot = serde_json::from_str(&json)?;
        if snapshot.version > SNAPSHOT_VERSION {
            return Err(SnapshotError::Version(snapshot.version));
        }
        Ok(Some(snapshot))
    }

    /// Write via a temp file so a crash mid-write keeps the previous snapshot
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SnapshotError> {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let tmp = tmp_path(path);
        std::fs::write(&tmp, serde_json::to_vec_pretty(self)?)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

/// Fire-and-forget snapshot writer
///
/// Each [`SnapshotWriter::submit`] replaces the pending snapshot; the writer
/// task always persists the newest one, so rapid changes coalesce.
pub struct SnapshotWriter {
    tx: watch::Sender<Option<Snapshot>>,
    task: JoinHandle<()>,
}

impl SnapshotWriter {
    /// Start the writer task. Must be called inside a tokio runtime.
    pub fn spawn(path: PathBuf) -> Self {
        let (tx, mut rx) = watch::channel::<Option<Snapshot>>(None);
        let task = tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let Some(snapshot) = rx.borrow_and_update().clone() else {
                    continue;
                };
                let path = path.clone();
                let result = tokio::task::spawn_blocking(move || snapshot.save(&path)).await;
                match result {
                    Ok(Ok(())) => log::debug!("Snapshot saved"),
                    Ok(Err(e)) => log::warn!("Snapshot write failed: {}", e),
                    Err(e) => log::warn!("Snapshot writer task failed: {}", e),
                }
            }
        });
        Self { tx, task }
    }

    /// Queue a snapshot for writing
    pub fn submit(&self, snapshot: Snapshot) {
        self.tx.send_replace(Some(snapshot));
    }

    /// Stop accepting snapshots and wait for the last write to finish
    pub async fn shutdown(self) {
        drop(self.tx);
        if let Err(e) = self.task.await {
            log::warn!("Snapshot writer ended abnormally: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::generate_puzzle;

    fn scratch_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("gravity-garden-{}-{}", std::process::id(), name))
            .join("snapshot.json")
    }

    fn sample() -> Snapshot {
        let mut sessions = BTreeMap::new();
        sessions.insert(ClientId::from("10.0.0.1"), "🦊".to_string());
        let mut progress = BTreeMap::new();
        progress.insert(ClientId::from("10.0.0.1"), 3);
        let puzzle = generate_puzzle(4, "snap");
        Snapshot {
            version: SNAPSHOT_VERSION,
            sessions,
            puzzle_state: puzzle.clone(),
            difficulty: 4,
            progress,
            level: Some(puzzle),
            next_piece_id: 12,
        }
    }

    #[test]
    fn test_save_and_load() {
        let path = scratch_path("roundtrip");
        let snapshot = sample();
        snapshot.save(&path).unwrap();
        assert!(!tmp_path(&path).exists());
        assert_eq!(Snapshot::load(&path).unwrap(), Some(snapshot));
    }

    #[test]
    fn test_missing_snapshot() {
        assert_eq!(Snapshot::load(scratch_path("missing")).unwrap(), None);
    }

    #[test]
    fn test_layout_field_names() {
        let json = serde_json::to_value(sample()).unwrap();
        for key in ["sessions", "puzzleState", "difficulty", "progress"] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
        assert_eq!(json["sessions"]["10.0.0.1"], "🦊");
    }

    #[test]
    fn test_future_version_rejected() {
        let path = scratch_path("future");
        let mut snapshot = sample();
        snapshot.version = SNAPSHOT_VERSION + 1;
        snapshot.save(&path).unwrap();
        assert!(matches!(Snapshot::load(&path), Err(SnapshotError::Version(_))));
    }

    #[test]
    fn test_corrupt_snapshot() {
        let path = scratch_path("corrupt");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"{not json").unwrap();
        assert!(matches!(Snapshot::load(&path), Err(SnapshotError::Json(_))));
    }

    #[tokio::test]
    async fn test_writer_persists_latest() {
        let path = scratch_path("writer");
        let writer = SnapshotWriter::spawn(path.clone());
        let mut snapshot = sample();
        writer.submit(snapshot.clone());
        snapshot.difficulty = 9;
        writer.submit(snapshot.clone());
        writer.shutdown().await;
        assert_eq!(Snapshot::load(&path).unwrap().unwrap().difficulty, 9);
    }
}
