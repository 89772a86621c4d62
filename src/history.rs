//! Durable per-user conversation history.
//!
//! The store owns a single in-memory table mapping user IDs to bounded
//! conversation logs and mirrors every mutation to a JSON document on disk
//! (write-through). The on-disk shape matches what the bot has always
//! persisted: `{ "<user_id>": [["user", "hi"], ["assistant", "hello"]] }`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// Message role within a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// End-user message
    User,
    /// Assistant (AI) response
    Assistant,
    /// System directive prepended to prompts
    System,
}

impl Role {
    /// String form used on the completion API wire.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

/// One message contributed by either side of a conversation.
///
/// Serialized as a two-element `[role, content]` array so the durable store
/// stays compatible with the historical memory file format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(Role, String)", into = "(Role, String)")]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    /// Create a new turn.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

impl From<(Role, String)> for ConversationTurn {
    fn from((role, content): (Role, String)) -> Self {
        Self { role, content }
    }
}

impl From<ConversationTurn> for (Role, String) {
    fn from(turn: ConversationTurn) -> Self {
        (turn.role, turn.content)
    }
}

/// Mapping from user ID to that user's conversation log.
pub type HistoryTable = HashMap<String, Vec<ConversationTurn>>;

/// History store error type.
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    /// The durable document exists but cannot be parsed. Surfaced at startup
    /// so corruption is never silently turned into an empty table.
    #[error("History store at {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("History store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("History store serialization failed: {0}")]
    Serialize(#[source] serde_json::Error),
}

/// Durable, bounded per-user conversation history.
///
/// All mutations run under one mutex held across the read-modify-persist
/// sequence. Interleaved handlers for different users therefore cannot
/// overwrite each other's whole-table snapshot on disk.
#[derive(Debug)]
pub struct HistoryStore {
    path: PathBuf,
    max_history: usize,
    table: Mutex<HistoryTable>,
}

impl HistoryStore {
    /// Open the store, loading prior state from `path`.
    ///
    /// A missing file is not an error: the bot simply starts with no memory.
    /// A file that exists but does not parse is reported as
    /// [`HistoryError::Corrupt`]; the caller decides whether to bail out or
    /// continue with [`HistoryStore::empty`].
    pub fn open(path: impl Into<PathBuf>, max_history: usize) -> Result<Self, HistoryError> {
        let path = path.into();
        let table = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).map_err(|source| HistoryError::Corrupt {
                path: path.clone(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "No prior history, starting empty");
                HistoryTable::new()
            }
            Err(e) => return Err(HistoryError::Io(e)),
        };

        Ok(Self {
            path,
            max_history,
            table: Mutex::new(table),
        })
    }

    /// Create a store with an empty table, ignoring whatever is on disk.
    ///
    /// Used by bootstrap after logging a corrupt store; the first mutation
    /// overwrites the unreadable document.
    pub fn empty(path: impl Into<PathBuf>, max_history: usize) -> Self {
        Self {
            path: path.into(),
            max_history,
            table: Mutex::new(HistoryTable::new()),
        }
    }

    /// Configured per-user log bound. `0` means history is disabled.
    pub const fn max_history(&self) -> usize {
        self.max_history
    }

    /// Path of the durable document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a turn to `user_id`'s log, evicting oldest-first to keep the
    /// log within the bound, then persist the table before returning.
    pub async fn append(
        &self,
        user_id: &str,
        role: Role,
        content: impl Into<String>,
    ) -> Result<(), HistoryError> {
        let mut table = self.table.lock().await;
        let log = table.entry(user_id.to_string()).or_default();
        log.push(ConversationTurn::new(role, content));
        while log.len() > self.max_history {
            log.remove(0);
        }
        self.persist(&table).await
    }

    /// Remove `user_id`'s log entirely (not the same as evicting to empty:
    /// the key disappears from the table) and persist.
    ///
    /// Returns whether a log existed.
    pub async fn clear(&self, user_id: &str) -> Result<bool, HistoryError> {
        let mut table = self.table.lock().await;
        let existed = table.remove(user_id).is_some();
        self.persist(&table).await?;
        Ok(existed)
    }

    /// Current log for `user_id`, empty if absent. Never fails.
    pub async fn get(&self, user_id: &str) -> Vec<ConversationTurn> {
        self.table
            .lock()
            .await
            .get(user_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of users with a stored log.
    pub async fn user_count(&self) -> usize {
        self.table.lock().await.len()
    }

    /// Write the whole table to disk. Callers hold the table lock, so saves
    /// never interleave.
    async fn persist(&self, table: &HistoryTable) -> Result<(), HistoryError> {
        let json = serde_json::to_string_pretty(table).map_err(HistoryError::Serialize)?;
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store_at(dir: &tempfile::TempDir, max_history: usize) -> HistoryStore {
        HistoryStore::open(dir.path().join("memory.json"), max_history).unwrap()
    }

    #[tokio::test]
    async fn append_keeps_last_k_turns_in_order() {
        let dir = tempdir().unwrap();
        let store = store_at(&dir, 3);

        for i in 0..7 {
            store
                .append("u1", Role::User, format!("m{i}"))
                .await
                .unwrap();
        }

        let log = store.get("u1").await;
        assert_eq!(log.len(), 3);
        let contents: Vec<&str> = log.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["m4", "m5", "m6"]);
    }

    #[tokio::test]
    async fn log_length_is_min_of_appends_and_bound() {
        let dir = tempdir().unwrap();
        let store = store_at(&dir, 5);

        store.append("u1", Role::User, "only one").await.unwrap();
        assert_eq!(store.get("u1").await.len(), 1);
    }

    #[tokio::test]
    async fn eviction_scenario_from_mixed_roles() {
        let dir = tempdir().unwrap();
        let store = store_at(&dir, 2);

        store.append("u1", Role::User, "a").await.unwrap();
        store.append("u1", Role::Assistant, "b").await.unwrap();
        store.append("u1", Role::User, "c").await.unwrap();

        let log = store.get("u1").await;
        assert_eq!(
            log,
            vec![
                ConversationTurn::new(Role::Assistant, "b"),
                ConversationTurn::new(Role::User, "c"),
            ]
        );
    }

    #[tokio::test]
    async fn zero_bound_never_retains_turns() {
        let dir = tempdir().unwrap();
        let store = store_at(&dir, 0);

        store.append("u1", Role::User, "gone").await.unwrap();
        assert!(store.get("u1").await.is_empty());
    }

    #[tokio::test]
    async fn get_unknown_user_is_empty() {
        let dir = tempdir().unwrap();
        let store = store_at(&dir, 4);
        assert!(store.get("nobody").await.is_empty());
    }

    #[tokio::test]
    async fn clear_removes_the_user_entry() {
        let dir = tempdir().unwrap();
        let store = store_at(&dir, 4);

        store.append("u1", Role::User, "hi").await.unwrap();
        assert!(store.clear("u1").await.unwrap());
        assert!(!store.clear("u1").await.unwrap());
        assert_eq!(store.user_count().await, 0);
    }

    #[tokio::test]
    async fn persists_and_reloads_in_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("memory.json");

        {
            let store = HistoryStore::open(&path, 4).unwrap();
            store.append("u1", Role::User, "first").await.unwrap();
            store.append("u1", Role::Assistant, "second").await.unwrap();
            store.append("u2", Role::User, "other user").await.unwrap();
        }

        let reloaded = HistoryStore::open(&path, 4).unwrap();
        let log = reloaded.get("u1").await;
        assert_eq!(log.len(), 2);
        assert_eq!(log[0], ConversationTurn::new(Role::User, "first"));
        assert_eq!(log[1], ConversationTurn::new(Role::Assistant, "second"));
        assert_eq!(reloaded.get("u2").await.len(), 1);
    }

    #[tokio::test]
    async fn round_trips_at_the_eviction_boundary() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("memory.json");

        {
            let store = HistoryStore::open(&path, 2).unwrap();
            store.append("u1", Role::User, "a").await.unwrap();
            store.append("u1", Role::Assistant, "b").await.unwrap();
            store.append("u1", Role::User, "c").await.unwrap();
        }

        let reloaded = HistoryStore::open(&path, 2).unwrap();
        let contents: Vec<String> = reloaded
            .get("u1")
            .await
            .into_iter()
            .map(|t| t.content)
            .collect();
        assert_eq!(contents, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn on_disk_format_is_role_content_pairs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("memory.json");

        let store = HistoryStore::open(&path, 4).unwrap();
        store.append("u1", Role::User, "hello").await.unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let doc: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(doc["u1"][0][0], "user");
        assert_eq!(doc["u1"][0][1], "hello");
    }

    #[test]
    fn missing_file_opens_empty() {
        let dir = tempdir().unwrap();
        let store = HistoryStore::open(dir.path().join("absent.json"), 4).unwrap();
        assert_eq!(store.max_history(), 4);
    }

    #[test]
    fn corrupt_file_is_a_reportable_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("memory.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = HistoryStore::open(&path, 4).unwrap_err();
        assert!(matches!(err, HistoryError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn empty_store_overwrites_corrupt_document_on_first_mutation() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("memory.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = HistoryStore::empty(&path, 4);
        store.append("u1", Role::User, "fresh start").await.unwrap();

        let reloaded = HistoryStore::open(&path, 4).unwrap();
        assert_eq!(reloaded.get("u1").await.len(), 1);
    }

    #[tokio::test]
    async fn interleaved_writers_never_lose_updates() {
        let dir = tempdir().unwrap();
        let store = std::sync::Arc::new(store_at(&dir, 10));

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .append(&format!("user-{i}"), Role::User, "hi")
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let reloaded = HistoryStore::open(store.path(), 10).unwrap();
        assert_eq!(reloaded.user_count().await, 8);
    }
}
