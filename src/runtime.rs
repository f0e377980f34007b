//! Session runtime
//!
//! A [`SessionRuntime`] owns one session's in-memory document, serializes
//! every mutation to it, runs agent invocations and fans invocation events
//! out to registered listeners.
//!
//! ## Locking
//!
//! - `data` is held only around the in-memory mutation and the persistence
//!   write, never across a completion call.
//! - Per-agent turn locks serialize invocations of the same agent, so a
//!   second invocation builds its prompt after the first reply landed.
//! - The listener map uses a short synchronous lock; emission dispatches to
//!   a snapshot taken under it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::{mpsc, Mutex, MutexGuard};

use crate::agent::AgentRegistryHandle;
use crate::config::LlmDefaults;
use crate::error::Result;
use crate::llm::{CompletionClient, CompletionError, CompletionRequest};
use crate::prompt;
use crate::store::SessionStore;
use crate::types::{Message, SessionData, SessionIndexEntry, SYSTEM_SPEAKER, USER_SPEAKER};

/// Invocation progress event
///
/// Ephemeral: only the resolved content of a turn is ever persisted.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    StreamStart { speaker: String },
    StreamDelta { speaker: String, delta: String },
    StreamEnd { speaker: String, content: String },
    /// Complete reply from a non-streaming agent, or a runtime notice
    Message { speaker: String, content: String },
}

impl ChatEvent {
    /// Wire event name
    pub fn name(&self) -> &'static str {
        match self {
            ChatEvent::StreamStart { .. } => "stream_start",
            ChatEvent::StreamDelta { .. } => "stream_delta",
            ChatEvent::StreamEnd { .. } => "stream_end",
            ChatEvent::Message { .. } => "message",
        }
    }

    pub fn speaker(&self) -> &str {
        match self {
            ChatEvent::StreamStart { speaker }
            | ChatEvent::StreamDelta { speaker, .. }
            | ChatEvent::StreamEnd { speaker, .. }
            | ChatEvent::Message { speaker, .. } => speaker,
        }
    }

    /// True for the events that close a turn
    pub fn is_terminal(&self) -> bool {
        matches!(self, ChatEvent::StreamEnd { .. } | ChatEvent::Message { .. })
    }
}

/// Receives invocation events. Called from whichever task runs the
/// invocation, so implementations must not block.
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &ChatEvent);
}

impl EventListener for mpsc::UnboundedSender<ChatEvent> {
    fn on_event(&self, event: &ChatEvent) {
        // A closed receiver means the reader went away; history is unaffected
        let _ = self.send(event.clone());
    }
}

/// Handle returned by [`SessionRuntime::add_listener`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Shared collaborators handed to every runtime
#[derive(Clone)]
pub struct RuntimeContext {
    pub store: Arc<dyn SessionStore>,
    pub agents: AgentRegistryHandle,
    pub client: Arc<dyn CompletionClient>,
    pub llm: LlmDefaults,
}

/// Live wrapper around one session
pub struct SessionRuntime {
    id: String,
    data: Mutex<SessionData>,
    ctx: RuntimeContext,
    listeners: std::sync::Mutex<HashMap<ListenerId, Arc<dyn EventListener>>>,
    next_listener: AtomicU64,
    turn_locks: std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>,
    deleted: AtomicBool,
}

impl std::fmt::Debug for SessionRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRuntime")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl SessionRuntime {
    pub fn new(data: SessionData, ctx: RuntimeContext) -> Self {
        Self {
            id: data.id.clone(),
            data: Mutex::new(data),
            ctx,
            listeners: std::sync::Mutex::new(HashMap::new()),
            next_listener: AtomicU64::new(0),
            turn_locks: std::sync::Mutex::new(HashMap::new()),
            deleted: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Copy of the current document
    pub async fn snapshot(&self) -> SessionData {
        self.data.lock().await.clone()
    }

    pub async fn messages(&self) -> Vec<Message> {
        self.data.lock().await.messages.clone()
    }

    pub async fn index_entry(&self) -> SessionIndexEntry {
        self.data.lock().await.index_entry()
    }

    // ========================================================================
    // Listeners
    // ========================================================================

    pub fn add_listener(&self, listener: Arc<dyn EventListener>) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.lock_listeners().insert(id, listener);
        id
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.lock_listeners().remove(&id).is_some()
    }

    pub fn listener_count(&self) -> usize {
        self.lock_listeners().len()
    }

    /// Register a channel listener that is removed when the returned
    /// [`Subscription`] is dropped.
    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.add_listener(Arc::new(tx));
        Subscription {
            runtime: Arc::clone(self),
            id,
            rx,
        }
    }

    fn lock_listeners(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<ListenerId, Arc<dyn EventListener>>> {
        self.listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, event: ChatEvent) {
        let listeners: Vec<Arc<dyn EventListener>> =
            self.lock_listeners().values().cloned().collect();
        for listener in listeners {
            listener.on_event(&event);
        }
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Stop persisting this runtime; used when the session is deleted while
    /// work against it is still in flight.
    ///
    /// Waits for a write already under way, so nothing reaches the store
    /// after this returns. The guard holds off further mutations until the
    /// caller has removed the stored document.
    pub(crate) async fn mark_deleted(&self) -> MutexGuard<'_, SessionData> {
        let data = self.data.lock().await;
        self.deleted.store(true, Ordering::SeqCst);
        data
    }

    /// Undo [`mark_deleted`](Self::mark_deleted) after a failed delete
    pub(crate) fn restore(&self) {
        self.deleted.store(false, Ordering::SeqCst);
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::SeqCst)
    }

    async fn persist(&self, data: &SessionData) -> Result<()> {
        if self.is_deleted() {
            tracing::debug!(session_id = %self.id, "Session deleted, skipping save");
            return Ok(());
        }
        self.ctx.store.save(data).await.map_err(|e| {
            tracing::error!(
                session_id = %self.id,
                error = %e,
                "Failed to persist session, in-memory change rolled back"
            );
            e
        })
    }

    /// Persist the document as-is (used right after creation)
    pub async fn save(&self) -> Result<()> {
        let data = self.data.lock().await;
        self.persist(&data).await
    }

    async fn append(&self, message: Message) -> Result<String> {
        let id = message.id.clone();
        let mut data = self.data.lock().await;
        data.messages.push(message);
        if let Err(e) = self.persist(&data).await {
            data.messages.pop();
            return Err(e);
        }
        Ok(id)
    }

    // ========================================================================
    // Message operations
    // ========================================================================

    /// Append a user message and return its id
    pub async fn add_user_message(&self, content: &str, images: Vec<String>) -> Result<String> {
        let id = self
            .append(Message::new(USER_SPEAKER, content).with_images(images))
            .await?;
        tracing::debug!(session_id = %self.id, message_id = %id, "User message added");
        Ok(id)
    }

    pub async fn get_message(&self, message_id: &str) -> Option<Message> {
        self.data.lock().await.message(message_id).cloned()
    }

    /// Replace a message's content, keeping its identity. False if absent.
    pub async fn update_message(&self, message_id: &str, content: &str) -> Result<bool> {
        let mut data = self.data.lock().await;
        let Some(pos) = data.position(message_id) else {
            return Ok(false);
        };
        let edited = data.messages[pos].edited(content);
        let previous = std::mem::replace(&mut data.messages[pos], edited);
        if let Err(e) = self.persist(&data).await {
            data.messages[pos] = previous;
            return Err(e);
        }
        Ok(true)
    }

    /// Remove a message. False if absent.
    pub async fn delete_message(&self, message_id: &str) -> Result<bool> {
        let mut data = self.data.lock().await;
        let Some(pos) = data.position(message_id) else {
            return Ok(false);
        };
        let removed = data.messages.remove(pos);
        if let Err(e) = self.persist(&data).await {
            data.messages.insert(pos, removed);
            return Err(e);
        }
        Ok(true)
    }

    /// Update name and/or global prompt; persists only when something
    /// changed. Returns whether it did.
    pub async fn update_config(
        &self,
        name: Option<&str>,
        global_prompt: Option<&str>,
    ) -> Result<bool> {
        let mut data = self.data.lock().await;
        let before = (data.name.clone(), data.global_prompt.clone());
        let mut changed = false;
        if let Some(name) = name.filter(|n| *n != data.name) {
            data.name = name.to_string();
            changed = true;
        }
        if let Some(prompt) = global_prompt.filter(|p| *p != data.global_prompt) {
            data.global_prompt = prompt.to_string();
            changed = true;
        }
        if !changed {
            return Ok(false);
        }
        if let Err(e) = self.persist(&data).await {
            let (name, global_prompt) = before;
            data.name = name;
            data.global_prompt = global_prompt;
            return Err(e);
        }
        Ok(true)
    }

    // ========================================================================
    // Invocation
    // ========================================================================

    fn turn_lock(&self, agent: &str) -> Arc<Mutex<()>> {
        let mut locks = self
            .turn_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(locks.entry(agent.to_string()).or_default())
    }

    /// Run one agent turn and append its reply.
    ///
    /// Unknown agents produce a `System` notice event and `Ok(None)` without
    /// touching history. Completion failures become the reply text. Only a
    /// persistence failure is returned as an error.
    pub async fn invoke_agent(&self, name: &str) -> Result<Option<String>> {
        let registry = self.ctx.agents.snapshot();
        let Some(agent) = registry.get(name).cloned() else {
            tracing::warn!(session_id = %self.id, agent = %name, "Agent not found");
            self.emit(ChatEvent::Message {
                speaker: SYSTEM_SPEAKER.to_string(),
                content: format!("Agent not found: {name}"),
            });
            return Ok(None);
        };

        let turn = self.turn_lock(&agent.name);
        let _turn = turn.lock().await;

        let request = {
            let data = self.data.lock().await;
            prompt::build_request(&agent, &data, &self.ctx.llm)
        };

        tracing::info!(
            session_id = %self.id,
            agent = %agent.name,
            model = %request.model,
            stream = agent.stream,
            "Invoking agent"
        );

        let content = if agent.stream {
            self.run_streaming(&agent.name, request).await
        } else {
            self.run_blocking(&agent.name, request).await
        };

        self.append(Message::new(agent.name.clone(), content.clone()))
            .await?;
        Ok(Some(content))
    }

    async fn run_streaming(&self, speaker: &str, request: CompletionRequest) -> String {
        self.emit(ChatEvent::StreamStart {
            speaker: speaker.to_string(),
        });

        let mut content = String::new();
        let outcome: std::result::Result<(), CompletionError> = async {
            let mut chunks = self.ctx.client.complete_streaming(request).await?;
            while let Some(chunk) = chunks.next().await {
                let delta = chunk?;
                content.push_str(&delta);
                self.emit(ChatEvent::StreamDelta {
                    speaker: speaker.to_string(),
                    delta,
                });
            }
            Ok(())
        }
        .await;

        if let Err(e) = outcome {
            tracing::error!(
                session_id = %self.id,
                agent = %speaker,
                kind = e.kind(),
                error = %e,
                "Streaming completion failed"
            );
            content = e.visible_text();
        }

        self.emit(ChatEvent::StreamEnd {
            speaker: speaker.to_string(),
            content: content.clone(),
        });
        content
    }

    async fn run_blocking(&self, speaker: &str, request: CompletionRequest) -> String {
        let content = match self.ctx.client.complete(request).await {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(
                    session_id = %self.id,
                    agent = %speaker,
                    kind = e.kind(),
                    error = %e,
                    "Completion failed"
                );
                e.visible_text()
            }
        };

        self.emit(ChatEvent::Message {
            speaker: speaker.to_string(),
            content: content.clone(),
        });
        content
    }

    /// Append the user message, then invoke each mentioned agent in order.
    ///
    /// Later agents see earlier agents' replies in their prompt history.
    pub async fn chat(
        &self,
        content: &str,
        images: Vec<String>,
        mentioned: &[String],
    ) -> Result<String> {
        let user_message_id = self.add_user_message(content, images).await?;
        for name in mentioned {
            self.invoke_agent(name).await?;
        }
        Ok(user_message_id)
    }
}

/// Channel listener registration scoped to a value
///
/// Dropping it removes the listener from the runtime, on every exit path.
pub struct Subscription {
    runtime: Arc<SessionRuntime>,
    id: ListenerId,
    rx: mpsc::UnboundedReceiver<ChatEvent>,
}

impl Subscription {
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Next event, waiting if none is queued
    pub async fn recv(&mut self) -> Option<ChatEvent> {
        self.rx.recv().await
    }

    /// Next already-queued event, if any
    pub fn try_recv(&mut self) -> Option<ChatEvent> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.runtime.remove_listener(self.id);
    }
}
