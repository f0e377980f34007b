use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;

use crate::agent::AgentRegistry;
use crate::api::types::AgentsPayload;
use crate::error::Result;
use crate::server::state::AppState;

/// GET /agents - Current registry, never cached by clients.
pub async fn list_handler(State(state): State<AppState>) -> impl IntoResponse {
    let registry = state.directory.agents().snapshot();
    let payload = AgentsPayload {
        agents: registry.agents().to_vec(),
    };
    (
        [
            (header::CACHE_CONTROL, "no-cache, no-store, must-revalidate"),
            (header::PRAGMA, "no-cache"),
            (header::EXPIRES, "0"),
        ],
        Json(payload),
    )
}

/// POST /agents - Replace the registry and rewrite `agents.json`.
///
/// Requests already running keep the registry they started with.
pub async fn replace_handler(
    State(state): State<AppState>,
    Json(payload): Json<AgentsPayload>,
) -> Result<impl IntoResponse> {
    let registry = AgentRegistry::new(payload.agents)?;
    let count = registry.len();

    state
        .agent_store
        .save_and_swap(registry, state.directory.agents())
        .map_err(|e| {
            tracing::error!(
                path = %state.agent_store.path().display(),
                error = %e,
                "Failed to write agent registry"
            );
            e
        })?;

    tracing::info!(count, "Agent registry replaced");
    Ok(Json(serde_json::json!({ "status": "success", "count": count })))
}
