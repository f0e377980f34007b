//! Completion backend abstraction
//!
//! A [`CompletionClient`] turns an ordered role/content message list into
//! either one full reply or a stream of text chunks. The session runtime
//! only depends on this trait; [`openai::OpenAiClient`] is the HTTP
//! implementation for OpenAI-compatible endpoints.

pub mod openai;
pub mod retry;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stream of incremental text chunks from a streaming completion
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<String, CompletionError>> + Send>>;

/// Message role in a completion request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One part of a multimodal message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

/// Message content: plain text, or a list of text/image parts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// Concatenated text of all text parts
    pub fn text(&self) -> String {
        match self {
            MessageContent::Text(t) => t.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .collect::<Vec<_>>()
                .join(""),
        }
    }
}

/// A single message sent to the completion backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: MessageContent::Text(text.into()),
        }
    }
}

/// Per-agent endpoint and credential overrides
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Endpoint {
    /// Base URL; a trailing `#` means "use as the full endpoint, unmodified"
    pub base_url: Option<String>,
    pub api_key: Option<String>,
}

/// Request for one completion
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub stream: bool,
    pub endpoint: Endpoint,
}

/// Completion backend failures
///
/// Never surfaced as a request failure: the runtime renders them into the
/// conversation via [`CompletionError::visible_text`].
#[derive(Debug, Clone, Error)]
pub enum CompletionError {
    #[error("network error: {0}")]
    Network(String),

    #[error("authentication rejected ({status}): {body}")]
    Auth { status: u16, body: String },

    #[error("rate limited ({status}): {body}")]
    RateLimited { status: u16, body: String },

    #[error("backend returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl CompletionError {
    /// Classify a non-success HTTP status
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => CompletionError::Auth { status, body },
            429 => CompletionError::RateLimited { status, body },
            _ => CompletionError::Api { status, body },
        }
    }

    /// Short failure kind tag
    pub fn kind(&self) -> &'static str {
        match self {
            CompletionError::Network(_) => "NetworkError",
            CompletionError::Auth { .. } => "AuthError",
            CompletionError::RateLimited { .. } => "RateLimited",
            CompletionError::Api { .. } => "ApiError",
            CompletionError::MalformedResponse(_) => "MalformedResponse",
        }
    }

    /// Text stored in history in place of the agent's reply
    pub fn visible_text(&self) -> String {
        format!("[invocation failed] {}: {}", self.kind(), self)
    }
}

/// Chat-completion backend
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Single blocking completion returning the full text
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError>;

    /// Streaming completion returning incremental text chunks
    async fn complete_streaming(
        &self,
        request: CompletionRequest,
    ) -> Result<ChunkStream, CompletionError>;
}
