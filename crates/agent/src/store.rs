//! Persistence for paused loop sessions and their edit ledgers.
//!
//! A paused session has to outlive the process that ran it so the user can
//! continue it later. Two backends:
//! - [`InMemorySessionStore`] for tests and single-process use
//! - [`FileSessionStore`], one pretty-printed JSON file per record
//!
//! Storage location for the file backend: `~/.editstage/sessions/`

use async_trait::async_trait;
use editstage_config::EditstageConfig;
use editstage_core::error::StoreError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::ledger::{EditAttemptLedger, EditAttemptLedgerState};
use crate::session::LoopSession;

/// Sessions are keyed by `session_id`, ledgers by the step id that owns them.
/// Saving an existing key replaces the record.
#[async_trait]
pub trait SessionStore: Send + Sync {
    fn name(&self) -> &str;

    async fn save_session(&self, session: &LoopSession) -> Result<(), StoreError>;

    /// `Ok(None)` when no session with this id was saved.
    async fn load_session(&self, session_id: &str) -> Result<Option<LoopSession>, StoreError>;

    async fn save_ledger(&self, step_id: &str, ledger: &EditAttemptLedger) -> Result<(), StoreError>;

    async fn load_ledger(&self, step_id: &str) -> Result<Option<EditAttemptLedger>, StoreError>;

    /// Remove a session. Returns whether anything was removed.
    async fn delete(&self, session_id: &str) -> Result<bool, StoreError>;

    /// All stored session ids, sorted.
    async fn list_sessions(&self) -> Result<Vec<String>, StoreError>;
}

#[derive(Default, Clone)]
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<HashMap<String, LoopSession>>>,
    ledgers: Arc<RwLock<HashMap<String, EditAttemptLedgerState>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn save_session(&self, session: &LoopSession) -> Result<(), StoreError> {
        self.sessions
            .write()
            .await
            .insert(session.session_id.clone(), session.clone());
        Ok(())
    }

    async fn load_session(&self, session_id: &str) -> Result<Option<LoopSession>, StoreError> {
        Ok(self.sessions.read().await.get(session_id).cloned())
    }

    async fn save_ledger(&self, step_id: &str, ledger: &EditAttemptLedger) -> Result<(), StoreError> {
        self.ledgers
            .write()
            .await
            .insert(step_id.to_string(), ledger.state().clone());
        Ok(())
    }

    async fn load_ledger(&self, step_id: &str) -> Result<Option<EditAttemptLedger>, StoreError> {
        Ok(self
            .ledgers
            .read()
            .await
            .get(step_id)
            .cloned()
            .map(EditAttemptLedger::from_state))
    }

    async fn delete(&self, session_id: &str) -> Result<bool, StoreError> {
        Ok(self.sessions.write().await.remove(session_id).is_some())
    }

    async fn list_sessions(&self) -> Result<Vec<String>, StoreError> {
        let mut ids: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

const SESSION_PREFIX: &str = "session-";
const LEDGER_PREFIX: &str = "ledger-";

/// `session-<id>.json` and `ledger-<step_id>.json` files under `dir`.
///
/// Writes go to a temporary sibling first and are renamed into place, so a
/// crash mid-write never leaves a half-written record behind.
pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    /// The directory is created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        debug!(dir = %dir.display(), "File session store opened");
        Self { dir }
    }

    /// Default directory: `~/.editstage/sessions`
    pub fn default_dir() -> PathBuf {
        EditstageConfig::config_dir().join("sessions")
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, prefix: &str, id: &str) -> Result<PathBuf, StoreError> {
        if id.is_empty() || id.contains(['/', '\\']) || id.starts_with('.') {
            return Err(StoreError::Storage(format!("Invalid record id: {id:?}")));
        }
        Ok(self.dir.join(format!("{prefix}{id}.json")))
    }

    async fn write_record<T: Serialize + Sync>(&self, path: &Path, record: &T) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            StoreError::Storage(format!("Failed to create session directory: {e}"))
        })?;

        let json = serde_json::to_string_pretty(record)
            .map_err(|e| StoreError::Storage(format!("Failed to serialize record: {e}")))?;

        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to write record file: {e}")))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to move record into place: {e}")))?;
        Ok(())
    }

    async fn read_record<T: DeserializeOwned + Send>(&self, path: &Path, id: &str) -> Result<Option<T>, StoreError> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(StoreError::Storage(format!("Failed to read record file: {e}")));
            }
        };

        serde_json::from_str(&content).map(Some).map_err(|e| {
            warn!(id, path = %path.display(), error = %e, "Corrupted record file");
            StoreError::Corrupted {
                id: id.to_string(),
                reason: e.to_string(),
            }
        })
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn save_session(&self, session: &LoopSession) -> Result<(), StoreError> {
        let path = self.path_for(SESSION_PREFIX, &session.session_id)?;
        self.write_record(&path, session).await?;
        debug!(session_id = %session.session_id, path = %path.display(), "Session saved");
        Ok(())
    }

    async fn load_session(&self, session_id: &str) -> Result<Option<LoopSession>, StoreError> {
        let path = self.path_for(SESSION_PREFIX, session_id)?;
        self.read_record(&path, session_id).await
    }

    async fn save_ledger(&self, step_id: &str, ledger: &EditAttemptLedger) -> Result<(), StoreError> {
        let path = self.path_for(LEDGER_PREFIX, step_id)?;
        self.write_record(&path, ledger.state()).await?;
        debug!(step_id, status = ?ledger.status(), "Ledger saved");
        Ok(())
    }

    async fn load_ledger(&self, step_id: &str) -> Result<Option<EditAttemptLedger>, StoreError> {
        let path = self.path_for(LEDGER_PREFIX, step_id)?;
        let state: Option<EditAttemptLedgerState> = self.read_record(&path, step_id).await?;
        Ok(state.map(EditAttemptLedger::from_state))
    }

    async fn delete(&self, session_id: &str) -> Result<bool, StoreError> {
        let path = self.path_for(SESSION_PREFIX, session_id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::Storage(format!("Failed to delete session file: {e}"))),
        }
    }

    async fn list_sessions(&self) -> Result<Vec<String>, StoreError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(StoreError::Storage(format!(
                    "Failed to list session directory: {e}"
                )));
            }
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::Storage(e.to_string()))?
        {
            let name = entry.file_name();
            if let Some(id) = name
                .to_str()
                .and_then(|n| n.strip_prefix(SESSION_PREFIX))
                .and_then(|n| n.strip_suffix(".json"))
            {
                ids.push(id.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{LedgerOptions, TargetFile};
    use crate::session::{LoopSessionParams, RunResult};
    use editstage_core::payload::StopReason;
    use editstage_staging::StagedEditBuffer;

    fn paused_session(id: &str) -> LoopSession {
        let mut buffer = StagedEditBuffer::new();
        buffer.write("src/lib.rs", "pub fn staged() {}\n", false);
        let session = LoopSession::create(
            LoopSessionParams::new("task-1", "step-1").with_session_id(id),
        );
        session.update_after_run(&RunResult {
            iterations: 10,
            input_tokens: 1200,
            output_tokens: 300,
            tool_calls: 4,
            stop_reason: Some(StopReason::MaxIterations),
            final_text: "Still working".into(),
            staged_snapshot: Some(buffer.to_snapshot()),
            conversation_snapshot: Some(serde_json::json!([{"role": "user", "content": "go"}])),
        })
    }

    fn half_done_ledger() -> EditAttemptLedger {
        let mut ledger = EditAttemptLedger::new(
            vec![TargetFile::new("a.rs", "fix"), TargetFile::new("b.rs", "fix")],
            LedgerOptions::default(),
        );
        ledger.mark_in_progress("a.rs").unwrap();
        ledger.mark_failed("a.rs", "truncated").unwrap();
        ledger
    }

    #[tokio::test]
    async fn in_memory_save_load_delete() {
        let store = InMemorySessionStore::new();
        assert_eq!(store.name(), "in_memory");
        assert!(store.load_session("s1").await.unwrap().is_none());

        let session = paused_session("s1");
        store.save_session(&session).await.unwrap();
        assert_eq!(store.load_session("s1").await.unwrap(), Some(session));
        assert_eq!(store.list_sessions().await.unwrap(), vec!["s1"]);

        assert!(store.delete("s1").await.unwrap());
        assert!(!store.delete("s1").await.unwrap());
    }

    #[tokio::test]
    async fn in_memory_ledger_round_trip() {
        let store = InMemorySessionStore::new();
        assert!(store.load_ledger("step-1").await.unwrap().is_none());
        let ledger = half_done_ledger();
        store.save_ledger("step-1", &ledger).await.unwrap();
        assert_eq!(store.load_ledger("step-1").await.unwrap(), Some(ledger));
    }

    #[tokio::test]
    async fn file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path().join("sessions"));

        let session = paused_session("abc-123");
        store.save_session(&session).await.unwrap();

        let loaded = store.load_session("abc-123").await.unwrap().unwrap();
        assert_eq!(loaded, session);
        assert_eq!(loaded.restore_buffer().read("src/lib.rs"), Some("pub fn staged() {}\n"));
        assert!(dir.path().join("sessions/session-abc-123.json").exists());
        assert!(!dir.path().join("sessions/session-abc-123.json.tmp").exists());
    }

    #[tokio::test]
    async fn file_store_ledger_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path());
        let ledger = half_done_ledger();
        store.save_ledger("step-1", &ledger).await.unwrap();

        let loaded = store.load_ledger("step-1").await.unwrap().unwrap();
        assert_eq!(loaded, ledger);
        assert_eq!(loaded.next_file().unwrap().path, "b.rs");
        // Ledgers are not sessions.
        assert!(store.list_sessions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn file_store_overwrites_on_resave() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path());

        let session = paused_session("s1");
        store.save_session(&session).await.unwrap();
        let continued = session.increment_continue();
        store.save_session(&continued).await.unwrap();

        assert_eq!(store.load_session("s1").await.unwrap().unwrap().continue_count, 1);
        assert_eq!(store.list_sessions().await.unwrap(), vec!["s1"]);
    }

    #[tokio::test]
    async fn file_store_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path().join("never-created"));
        assert!(store.load_session("nope").await.unwrap().is_none());
        assert!(store.load_ledger("nope").await.unwrap().is_none());
        assert!(store.list_sessions().await.unwrap().is_empty());
        assert!(!store.delete("nope").await.unwrap());
    }

    #[tokio::test]
    async fn file_store_reports_corruption() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("session-bad.json"), "{ not json").unwrap();
        let store = FileSessionStore::new(dir.path());
        assert!(matches!(
            store.load_session("bad").await,
            Err(StoreError::Corrupted { id, .. }) if id == "bad"
        ));
    }

    #[tokio::test]
    async fn file_store_rejects_path_like_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path());
        assert!(store.load_session("../escape").await.is_err());
        assert!(store.load_session("").await.is_err());
        let mut session = paused_session("ok");
        session.session_id = "a/b".into();
        assert!(store.save_session(&session).await.is_err());
    }
}
