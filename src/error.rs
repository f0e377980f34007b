//! Error types for a3s-chorus

use thiserror::Error;

/// Errors surfaced by session, agent, and persistence operations
///
/// Completion backend failures are deliberately absent: they are converted
/// into visible chat messages by the session runtime (see
/// [`crate::llm::CompletionError`]).
#[derive(Debug, Error)]
pub enum ChorusError {
    /// Session id not present in memory or persistence
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Message id not present in the session
    #[error("Message not found: {0}")]
    MessageNotFound(String),

    /// Malformed request payload
    #[error("Validation error: {0}")]
    Validation(String),

    /// Whole-document read or write failure
    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("Server error: {0}")]
    Server(String),
}

impl ChorusError {
    /// True for the 404-class variants
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ChorusError::SessionNotFound(_) | ChorusError::MessageNotFound(_)
        )
    }
}

/// Result type alias for chorus operations
pub type Result<T> = std::result::Result<T, ChorusError>;

impl axum::response::IntoResponse for ChorusError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;

        let status = match &self {
            e if e.is_not_found() => StatusCode::NOT_FOUND,
            ChorusError::Validation(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        let body = serde_json::json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}
