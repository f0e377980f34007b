pub mod agents;
pub mod chat;
pub mod messages;
pub mod sessions;
pub mod types;

use axum::routing::{get, post};
use axum::{Json, Router};

use crate::server::state::AppState;

/// Build every API route.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_handler))
        .route(
            "/agents",
            get(agents::list_handler).post(agents::replace_handler),
        )
        .route(
            "/sessions",
            get(sessions::list_handler).post(sessions::create_handler),
        )
        .route(
            "/sessions/:session_id",
            get(sessions::get_handler)
                .patch(sessions::update_handler)
                .delete(sessions::delete_handler),
        )
        .route("/sessions/:session_id/fork", post(sessions::fork_handler))
        .route(
            "/sessions/:session_id/messages/:message_id",
            get(messages::get_handler)
                .patch(messages::update_handler)
                .delete(messages::delete_handler),
        )
        .route("/chat/data", post(chat::chat_handler))
        .route("/invoke", post(chat::invoke_handler))
        .route("/message", post(messages::add_handler))
}

/// GET /health
pub async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
