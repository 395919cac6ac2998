//! Player handles and completion leaderboard
//!
//! Persisted in the session snapshot so handles and counts survive restarts.

use std::collections::BTreeMap;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::sim::ClientId;

/// Maximum number of entries broadcast to clients
pub const MAX_LEADERBOARD_ENTRIES: usize = 10;

/// Longest accepted display handle (in characters)
pub const MAX_HANDLE_LEN: usize = 16;

/// Handles handed out to new players
pub const EMOJI_POOL: [&str; 16] = [
    "🐢", "🦊", "🐙", "🦉", "🐝", "🦋", "🐸", "🦄", "🐧", "🦔", "🐳", "🦜", "🐞", "🦀", "🐼", "🦥",
];

/// A single leaderboard row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub client_id: ClientId,
    pub emoji: String,
    /// Puzzles completed
    pub count: u32,
}

/// Player handles and completion counts, keyed by client
#[derive(Debug, Clone, Default)]
pub struct Leaderboard {
    /// client -> display handle
    pub handles: BTreeMap<ClientId, String>,
    /// client -> puzzles completed
    pub progress: BTreeMap<ClientId, u32>,
}

impl Leaderboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_parts(handles: BTreeMap<ClientId, String>, progress: BTreeMap<ClientId, u32>) -> Self {
        Self { handles, progress }
    }

    /// Current handle, or a placeholder for unknown clients
    pub fn handle(&self, client: &ClientId) -> &str {
        self.handles.get(client).map(String::as_str).unwrap_or("❔")
    }

    /// Return the client's handle, assigning one from the pool on first sight.
    /// The bool is true when a new handle was assigned.
    pub fn ensure_handle<R: Rng>(&mut self, client: &ClientId, rng: &mut R) -> (String, bool) {
        if let Some(handle) = self.handles.get(client) {
            return (handle.clone(), false);
        }
        let handle = EMOJI_POOL[rng.random_range(0..EMOJI_POOL.len())].to_string();
        self.handles.insert(client.clone(), handle.clone());
        (handle, true)
    }

    /// Change a handle. Returns false (and changes nothing) for an invalid one.
    pub fn set_handle(&mut self, client: &ClientId, handle: &str) -> bool {
        let handle = handle.trim();
        if handle.is_empty() || handle.chars().count() > MAX_HANDLE_LEN {
            return false;
        }
        self.handles.insert(client.clone(), handle.to_string());
        true
    }

    /// Count one completed puzzle, returning the new total
    pub fn record_completion(&mut self, client: &ClientId) -> u32 {
        let count = self.progress.entry(client.clone()).or_insert(0);
        *count += 1;
        *count
    }

    pub fn completions(&self, client: &ClientId) -> u32 {
        self.progress.get(client).copied().unwrap_or(0)
    }

    /// Top entries for broadcast, most completions first (ties by client id)
    pub fn entries(&self) -> Vec<LeaderboardEntry> {
        let mut entries: Vec<_> = self
            .progress
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(client, count)| LeaderboardEntry {
                client_id: client.clone(),
                emoji: self.handle(client).to_string(),
                count: *count,
            })
            .collect();
        entries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.client_id.cmp(&b.client_id)));
        entries.truncate(MAX_LEADERBOARD_ENTRIES);
        entries
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_pcg::Pcg32;

    use super::*;

    #[test]
    fn test_handle_assigned_once() {
        let mut board = Leaderboard::new();
        let mut rng = Pcg32::seed_from_u64(7);
        let client = ClientId::from("10.0.0.1");
        let (first, new) = board.ensure_handle(&client, &mut rng);
        assert!(new);
        assert!(EMOJI_POOL.contains(&first.as_str()));
        let (again, new) = board.ensure_handle(&client, &mut rng);
        assert!(!new);
        assert_eq!(first, again);
    }

    #[test]
    fn test_set_handle_validation() {
        let mut board = Leaderboard::new();
        let client = ClientId::from("10.0.0.1");
        assert!(board.set_handle(&client, "🚀"));
        assert_eq!(board.handle(&client), "🚀");
        assert!(!board.set_handle(&client, "   "));
        assert!(!board.set_handle(&client, &"x".repeat(MAX_HANDLE_LEN + 1)));
        assert_eq!(board.handle(&client), "🚀");
    }

    #[test]
    fn test_ranking() {
        let mut board = Leaderboard::new();
        let a = ClientId::from("a");
        let b = ClientId::from("b");
        assert!(board.entries().is_empty());

        board.record_completion(&a);
        assert_eq!(board.record_completion(&b), 1);
        assert_eq!(board.record_completion(&b), 2);

        let entries = board.entries();
        assert_eq!(entries[0].client_id, b);
        assert_eq!(entries[0].count, 2);
        assert_eq!(entries[1].client_id, a);
        assert_eq!(board.completions(&a), 1);
    }

    #[test]
    fn test_entries_truncated() {
        let mut board = Leaderboard::new();
        for i in 0..(MAX_LEADERBOARD_ENTRIES + 5) {
            board.record_completion(&ClientId(format!("c{i}")));
        }
        assert_eq!(board.entries().len(), MAX_LEADERBOARD_ENTRIES);
    }
}
