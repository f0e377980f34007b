use serde::{Deserialize, Serialize};

use crate::agent::AgentDefinition;
use crate::types::{Message, SessionData, SessionIndexEntry};

// ============================================================================
// Requests
// ============================================================================

/// POST /sessions
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub global_prompt: String,
}

/// PATCH /sessions/{id}
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateSessionRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub global_prompt: Option<String>,
}

/// POST /sessions/{id}/fork
#[derive(Debug, Clone, Deserialize)]
pub struct ForkSessionRequest {
    pub message_id: String,
    #[serde(default)]
    pub new_name: Option<String>,
}

/// POST /chat/data and POST /message
#[derive(Debug, Clone, Deserialize)]
pub struct MessageRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    pub message: String,
    /// Base64 payloads or `data:` URIs
    #[serde(default)]
    pub images: Vec<String>,
}

/// POST /invoke
#[derive(Debug, Clone, Deserialize)]
pub struct InvokeRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    pub agent_name: String,
}

/// PATCH /sessions/{id}/messages/{message_id}
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateMessageRequest {
    pub content: String,
}

/// GET and POST /agents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentsPayload {
    pub agents: Vec<AgentDefinition>,
}

// ============================================================================
// Responses
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionIndexEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub name: String,
    pub global_prompt: String,
    pub created_at: f64,
}

impl From<&SessionData> for SessionSummary {
    fn from(data: &SessionData) -> Self {
        Self {
            id: data.id.clone(),
            name: data.name.clone(),
            global_prompt: data.global_prompt.clone(),
            created_at: data.created_at,
        }
    }
}

/// Session with its full history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDetail {
    #[serde(flatten)]
    pub summary: SessionSummary,
    pub history: Vec<Message>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForkResponse {
    #[serde(flatten)]
    pub summary: SessionSummary,
    pub message_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddMessageResponse {
    pub status: String,
    pub session_id: String,
    pub message_id: String,
    pub message_count: usize,
}
