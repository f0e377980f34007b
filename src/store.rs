//! Session persistence layer
//!
//! Provides pluggable session storage via the [`SessionStore`] trait. A
//! session is always read and written as one whole document.
//!
//! ## Default Implementation
//!
//! [`FileSessionStore`] keeps one JSON document per session plus an index
//! summarizing all of them:
//!
//! ```text
//! sessions/
//!   _index.json          {"sessions": [SessionIndexEntry, ...]}
//!   <session-id>.json    SessionData
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};

use crate::error::{ChorusError, Result};
use crate::types::{SessionData, SessionIndexEntry};

const INDEX_FILE: &str = "_index.json";

/// Session storage trait
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    /// Load a session document; `None` if absent
    async fn load(&self, id: &str) -> Result<Option<SessionData>>;

    /// Write the whole session document and refresh its index entry
    async fn save(&self, session: &SessionData) -> Result<()>;

    /// Remove a session document and its index entry; false if absent
    async fn delete(&self, id: &str) -> Result<bool>;

    /// Index entries, newest first
    async fn list_index(&self) -> Result<Vec<SessionIndexEntry>>;

    /// Backend name for diagnostics
    fn backend_name(&self) -> &str {
        "unknown"
    }
}

/// True if `id` is safe to use as a file stem
pub fn is_valid_session_id(id: &str) -> bool {
    !id.is_empty()
        && id != "_index"
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn sorted_newest_first(mut entries: Vec<SessionIndexEntry>) -> Vec<SessionIndexEntry> {
    entries.sort_by(|a, b| b.created_at.total_cmp(&a.created_at));
    entries
}

#[derive(Serialize, Deserialize)]
struct IndexDocument {
    #[serde(default)]
    sessions: Vec<SessionIndexEntry>,
}

// ============================================================================
// File-based Session Store
// ============================================================================

/// File-based session store
pub struct FileSessionStore {
    dir: PathBuf,
    /// In-memory copy of `_index.json`; the lock also serializes index writes
    index: Mutex<HashMap<String, SessionIndexEntry>>,
}

impl FileSessionStore {
    /// Open the store, creating the directory if needed.
    ///
    /// Loads `_index.json`, or rebuilds it by scanning session documents
    /// when it is missing.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).await.map_err(|e| {
            ChorusError::Persistence(format!(
                "Failed to create session directory {}: {}",
                dir.display(),
                e
            ))
        })?;

        let index_path = dir.join(INDEX_FILE);
        let index = if index_path.exists() {
            let json = fs::read_to_string(&index_path).await.map_err(|e| {
                ChorusError::Persistence(format!(
                    "Failed to read session index {}: {}",
                    index_path.display(),
                    e
                ))
            })?;
            let doc: IndexDocument = serde_json::from_str(&json).map_err(|e| {
                ChorusError::Persistence(format!(
                    "Failed to parse session index {}: {}",
                    index_path.display(),
                    e
                ))
            })?;
            doc.sessions
                .into_iter()
                .map(|entry| (entry.id.clone(), entry))
                .collect()
        } else {
            HashMap::new()
        };

        let store = Self {
            dir,
            index: Mutex::new(index),
        };

        if !index_path.exists() {
            let rebuilt = store.scan_documents().await?;
            if !rebuilt.is_empty() {
                tracing::info!(
                    dir = %store.dir.display(),
                    count = rebuilt.len(),
                    "Rebuilt session index from documents"
                );
                let mut index = store.index.lock().await;
                *index = rebuilt;
                store.write_index(&index).await?;
            }
        }

        Ok(store)
    }

    /// Directory holding the session documents
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn session_path(&self, id: &str) -> Option<PathBuf> {
        is_valid_session_id(id).then(|| self.dir.join(format!("{}.json", id)))
    }

    async fn scan_documents(&self) -> Result<HashMap<String, SessionIndexEntry>> {
        let mut found = HashMap::new();
        let mut entries = fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_doc = path.extension().is_some_and(|ext| ext == "json")
                && path.file_name().is_some_and(|name| name != INDEX_FILE);
            if !is_doc {
                continue;
            }
            let parsed = match fs::read_to_string(&path).await {
                Ok(json) => serde_json::from_str::<SessionData>(&json).map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };
            match parsed {
                Ok(data) => {
                    found.insert(data.id.clone(), data.index_entry());
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable session document");
                }
            }
        }
        Ok(found)
    }

    async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
        let tmp_path = path.with_extension("json.tmp");
        let write = async {
            let mut file = fs::File::create(&tmp_path).await?;
            file.write_all(bytes).await?;
            file.sync_all().await?;
            fs::rename(&tmp_path, path).await?;
            std::io::Result::Ok(())
        };
        write.await.map_err(|e| {
            ChorusError::Persistence(format!("Failed to write {}: {}", path.display(), e))
        })
    }

    async fn write_index(&self, index: &HashMap<String, SessionIndexEntry>) -> Result<()> {
        let doc = IndexDocument {
            sessions: sorted_newest_first(index.values().cloned().collect()),
        };
        let json = serde_json::to_string_pretty(&doc)?;
        Self::write_atomic(&self.dir.join(INDEX_FILE), json.as_bytes()).await
    }
}

#[async_trait::async_trait]
impl SessionStore for FileSessionStore {
    async fn load(&self, id: &str) -> Result<Option<SessionData>> {
        let Some(path) = self.session_path(id) else {
            return Ok(None);
        };
        if !path.exists() {
            return Ok(None);
        }

        let json = fs::read_to_string(&path).await.map_err(|e| {
            ChorusError::Persistence(format!(
                "Failed to read session file {}: {}",
                path.display(),
                e
            ))
        })?;
        let data: SessionData = serde_json::from_str(&json).map_err(|e| {
            ChorusError::Persistence(format!(
                "Failed to parse session file {}: {}",
                path.display(),
                e
            ))
        })?;

        tracing::debug!(session_id = %id, path = %path.display(), "Loaded session");
        Ok(Some(data))
    }

    async fn save(&self, session: &SessionData) -> Result<()> {
        let path = self.session_path(&session.id).ok_or_else(|| {
            ChorusError::Validation(format!("invalid session id: {}", session.id))
        })?;
        let json = serde_json::to_string_pretty(session)?;

        let mut index = self.index.lock().await;
        Self::write_atomic(&path, json.as_bytes()).await?;

        let previous = index.insert(session.id.clone(), session.index_entry());
        if let Err(e) = self.write_index(&index).await {
            match previous {
                Some(entry) => index.insert(session.id.clone(), entry),
                None => index.remove(&session.id),
            };
            return Err(e);
        }

        tracing::debug!(
            session_id = %session.id,
            messages = session.messages.len(),
            "Saved session"
        );
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let Some(path) = self.session_path(id) else {
            return Ok(false);
        };

        let mut index = self.index.lock().await;
        let had_file = path.exists();
        if had_file {
            fs::remove_file(&path).await.map_err(|e| {
                ChorusError::Persistence(format!(
                    "Failed to delete session file {}: {}",
                    path.display(),
                    e
                ))
            })?;
        }
        let had_entry = index.remove(id).is_some();
        if had_entry {
            self.write_index(&index).await?;
        }

        if had_file || had_entry {
            tracing::debug!(session_id = %id, "Deleted session");
        }
        Ok(had_file || had_entry)
    }

    async fn list_index(&self) -> Result<Vec<SessionIndexEntry>> {
        let index = self.index.lock().await;
        Ok(sorted_newest_first(index.values().cloned().collect()))
    }

    fn backend_name(&self) -> &str {
        "file"
    }
}

// ============================================================================
// In-Memory Session Store (for testing)
// ============================================================================

/// In-memory session store for testing
///
/// [`MemorySessionStore::fail_writes`] makes every save and delete fail, for
/// exercising the write-failure paths of callers.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, SessionData>>,
    fail_writes: AtomicBool,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(ChorusError::Persistence(
                "memory store is read-only".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, id: &str) -> Result<Option<SessionData>> {
        Ok(self.sessions.read().await.get(id).cloned())
    }

    async fn save(&self, session: &SessionData) -> Result<()> {
        self.check_writable()?;
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        self.check_writable()?;
        Ok(self.sessions.write().await.remove(id).is_some())
    }

    async fn list_index(&self) -> Result<Vec<SessionIndexEntry>> {
        let sessions = self.sessions.read().await;
        Ok(sorted_newest_first(
            sessions.values().map(SessionData::index_entry).collect(),
        ))
    }

    fn backend_name(&self) -> &str {
        "memory"
    }
}
