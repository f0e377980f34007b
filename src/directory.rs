//! Session directory
//!
//! Maps session ids to live [`SessionRuntime`]s. Runtimes are loaded lazily
//! on first access and cached until the session is deleted.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::agent::AgentRegistryHandle;
use crate::error::{ChorusError, Result};
use crate::runtime::{RuntimeContext, SessionRuntime};
use crate::store::is_valid_session_id;
use crate::types::{Message, SessionData, SessionIndexEntry, DEFAULT_SESSION_NAME};

pub struct SessionDirectory {
    ctx: RuntimeContext,
    sessions: Mutex<HashMap<String, Arc<SessionRuntime>>>,
    /// Bumped before every delete; a lazy load that overlaps one is retried
    delete_epoch: AtomicU64,
}

impl SessionDirectory {
    pub fn new(ctx: RuntimeContext) -> Self {
        Self {
            ctx,
            sessions: Mutex::new(HashMap::new()),
            delete_epoch: AtomicU64::new(0),
        }
    }

    pub fn agents(&self) -> &AgentRegistryHandle {
        &self.ctx.agents
    }

    /// Session summaries, newest first
    pub async fn list(&self) -> Result<Vec<SessionIndexEntry>> {
        self.ctx.store.list_index().await
    }

    /// Number of runtimes currently held in memory
    pub async fn loaded(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Create and persist an empty session
    pub async fn create(
        &self,
        name: Option<&str>,
        global_prompt: &str,
    ) -> Result<Arc<SessionRuntime>> {
        let name = name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(DEFAULT_SESSION_NAME);
        self.install(SessionData::new(name, global_prompt)).await
    }

    async fn install(&self, data: SessionData) -> Result<Arc<SessionRuntime>> {
        // Fresh id: nobody can look it up before it is inserted
        let runtime = Arc::new(SessionRuntime::new(data, self.ctx.clone()));
        runtime.save().await?;
        self.sessions
            .lock()
            .await
            .insert(runtime.id().to_string(), Arc::clone(&runtime));
        tracing::info!(session_id = %runtime.id(), "Session created");
        Ok(runtime)
    }

    /// Cached runtime, or one loaded from the store; `None` if unknown
    pub async fn get(&self, id: &str) -> Result<Option<Arc<SessionRuntime>>> {
        if !is_valid_session_id(id) {
            return Ok(None);
        }
        loop {
            if let Some(runtime) = self.sessions.lock().await.get(id) {
                return Ok(Some(Arc::clone(runtime)));
            }

            let epoch = self.delete_epoch.load(Ordering::SeqCst);
            let Some(data) = self.ctx.store.load(id).await? else {
                return Ok(None);
            };

            let mut sessions = self.sessions.lock().await;
            if let Some(runtime) = sessions.get(id) {
                return Ok(Some(Arc::clone(runtime)));
            }
            if self.delete_epoch.load(Ordering::SeqCst) != epoch {
                tracing::debug!(session_id = %id, "Delete overlapped session load, retrying");
                continue;
            }
            let runtime = Arc::new(SessionRuntime::new(data, self.ctx.clone()));
            sessions.insert(id.to_string(), Arc::clone(&runtime));
            tracing::debug!(session_id = %id, "Session loaded");
            return Ok(Some(runtime));
        }
    }

    /// Like [`get`](Self::get), but failing with `SessionNotFound`
    pub async fn require(&self, id: &str) -> Result<Arc<SessionRuntime>> {
        self.get(id)
            .await?
            .ok_or_else(|| ChorusError::SessionNotFound(id.to_string()))
    }

    /// Resolve `id`, or create a fresh session when it is absent or unknown
    pub async fn get_or_create(&self, id: Option<&str>) -> Result<Arc<SessionRuntime>> {
        if let Some(id) = id.filter(|id| !id.is_empty()) {
            if let Some(runtime) = self.get(id).await? {
                return Ok(runtime);
            }
            tracing::debug!(session_id = %id, "Unknown session id, creating a new session");
        }
        self.create(None, "").await
    }

    /// Delete a session from memory and storage. False if it did not exist.
    ///
    /// In-flight work against the runtime finishes but no longer persists.
    /// A save already under way completes before the document is removed.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        self.delete_epoch.fetch_add(1, Ordering::SeqCst);
        let cached = self.sessions.lock().await.get(id).cloned();

        let guard = match &cached {
            Some(runtime) => Some(runtime.mark_deleted().await),
            None => None,
        };

        match self.ctx.store.delete(id).await {
            Ok(stored) => {
                self.sessions.lock().await.remove(id);
                drop(guard);
                let existed = stored || cached.is_some();
                if existed {
                    tracing::info!(session_id = %id, "Session deleted");
                }
                Ok(existed)
            }
            Err(e) => {
                if let Some(runtime) = &cached {
                    runtime.restore();
                }
                drop(guard);
                tracing::error!(session_id = %id, error = %e, "Failed to delete session");
                Err(e)
            }
        }
    }

    /// Start a new session from the history of `source_id` up to and
    /// including `message_id`.
    ///
    /// Messages are copied in order under fresh ids; the global prompt is
    /// carried over. The name defaults to `"<source name> (fork)"`.
    pub async fn fork(
        &self,
        source_id: &str,
        message_id: &str,
        new_name: Option<&str>,
    ) -> Result<Arc<SessionRuntime>> {
        let source = self.require(source_id).await?.snapshot().await;
        let end = source
            .position(message_id)
            .ok_or_else(|| ChorusError::MessageNotFound(message_id.to_string()))?;

        let name = match new_name.filter(|n| !n.trim().is_empty()) {
            Some(name) => name.to_string(),
            None => format!("{} (fork)", source.name),
        };
        let mut data = SessionData::new(name, source.global_prompt.clone());
        data.messages = source.messages[..=end]
            .iter()
            .map(Message::duplicate)
            .collect();

        let runtime = self.install(data).await?;
        tracing::info!(
            session_id = %runtime.id(),
            source = %source_id,
            message_id = %message_id,
            "Session forked"
        );
        Ok(runtime)
    }
}
