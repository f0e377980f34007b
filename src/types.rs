//! Core chat types for a3s-chorus
//!
//! All persisted types use snake_case JSON so session documents written by
//! earlier versions of the backend load unchanged.

use serde::{Deserialize, Serialize};

/// Speaker name used for messages written by the human participant
pub const USER_SPEAKER: &str = "user";

/// Speaker name used for runtime-generated notices (e.g. unknown agent)
pub const SYSTEM_SPEAKER: &str = "System";

/// Name given to sessions created without an explicit name
pub const DEFAULT_SESSION_NAME: &str = "New discussion";

const UNNAMED_SESSION: &str = "Untitled session";

/// A single chat message within a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Session-unique message identifier (12 hex chars)
    #[serde(default = "new_message_id")]
    pub id: String,

    /// Agent name, or [`USER_SPEAKER`]
    pub speaker: String,

    /// Text content
    pub content: String,

    /// Unix timestamp in seconds
    #[serde(default = "now_secs")]
    pub timestamp: f64,

    /// Image payloads (base64 or `data:` URIs), in attachment order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
}

impl Message {
    /// Create a message with a fresh id and the current timestamp
    pub fn new(speaker: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: new_message_id(),
            speaker: speaker.into(),
            content: content.into(),
            timestamp: now_secs(),
            images: Vec::new(),
        }
    }

    /// Attach image payloads
    pub fn with_images(mut self, images: Vec<String>) -> Self {
        self.images = images;
        self
    }

    /// Copy of this message with new content; id, speaker, timestamp and
    /// images are preserved.
    pub fn edited(&self, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..self.clone()
        }
    }

    /// Copy of this message under a fresh id (used when forking)
    pub fn duplicate(&self) -> Self {
        Self::new(self.speaker.clone(), self.content.clone()).with_images(self.images.clone())
    }
}

/// The persisted document for one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    pub id: String,

    #[serde(default = "unnamed_session")]
    pub name: String,

    /// Unix timestamp in seconds
    #[serde(default = "now_secs")]
    pub created_at: f64,

    /// Appended to every agent's system prompt
    #[serde(default)]
    pub global_prompt: String,

    #[serde(default)]
    pub messages: Vec<Message>,
}

impl SessionData {
    /// Create an empty session with a fresh id
    pub fn new(name: impl Into<String>, global_prompt: impl Into<String>) -> Self {
        Self {
            id: new_session_id(),
            name: name.into(),
            created_at: now_secs(),
            global_prompt: global_prompt.into(),
            messages: Vec::new(),
        }
    }

    /// Position of a message by id
    pub fn position(&self, message_id: &str) -> Option<usize> {
        self.messages.iter().position(|m| m.id == message_id)
    }

    /// Look up a message by id
    pub fn message(&self, message_id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == message_id)
    }

    /// Denormalized summary for the session index
    pub fn index_entry(&self) -> SessionIndexEntry {
        SessionIndexEntry {
            id: self.id.clone(),
            name: self.name.clone(),
            created_at: self.created_at,
            global_prompt: self.global_prompt.clone(),
            message_count: self.messages.len(),
        }
    }
}

/// Lightweight listing entry kept consistent with its [`SessionData`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionIndexEntry {
    pub id: String,

    #[serde(default = "unnamed_session")]
    pub name: String,

    #[serde(default = "now_secs")]
    pub created_at: f64,

    #[serde(default)]
    pub global_prompt: String,

    #[serde(default)]
    pub message_count: usize,
}

/// Generate a message id: the first 12 hex chars of a v4 UUID
pub fn new_message_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(12);
    id
}

/// Generate a session id: a v4 UUID in simple (hex) form
pub fn new_session_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Current Unix time in fractional seconds
pub fn now_secs() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}

fn unnamed_session() -> String {
    UNNAMED_SESSION.to_string()
}
