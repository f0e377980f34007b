use axum::extract::{Path, State};
use axum::Json;

use crate::api::types::{
    CreateSessionRequest, ForkResponse, ForkSessionRequest, SessionDetail, SessionListResponse,
    SessionSummary, UpdateSessionRequest,
};
use crate::error::{ChorusError, Result};
use crate::server::state::AppState;

/// GET /sessions - Session summaries, newest first.
pub async fn list_handler(State(state): State<AppState>) -> Result<Json<SessionListResponse>> {
    let sessions = state.directory.list().await?;
    Ok(Json(SessionListResponse { sessions }))
}

/// POST /sessions - Create an empty session.
pub async fn create_handler(
    State(state): State<AppState>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<Json<SessionSummary>> {
    let runtime = state
        .directory
        .create(request.name.as_deref(), &request.global_prompt)
        .await?;
    let data = runtime.snapshot().await;
    Ok(Json(SessionSummary::from(&data)))
}

/// GET /sessions/{id} - Session with full history.
pub async fn get_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionDetail>> {
    let data = state.directory.require(&session_id).await?.snapshot().await;
    Ok(Json(SessionDetail {
        summary: SessionSummary::from(&data),
        history: data.messages,
    }))
}

/// PATCH /sessions/{id} - Update name and/or global prompt.
pub async fn update_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<UpdateSessionRequest>,
) -> Result<Json<serde_json::Value>> {
    let runtime = state.directory.require(&session_id).await?;
    runtime
        .update_config(request.name.as_deref(), request.global_prompt.as_deref())
        .await?;
    Ok(Json(
        serde_json::json!({ "status": "success", "id": runtime.id() }),
    ))
}

/// DELETE /sessions/{id}
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    if !state.directory.delete(&session_id).await? {
        return Err(ChorusError::SessionNotFound(session_id));
    }
    Ok(Json(serde_json::json!({ "status": "success" })))
}

/// POST /sessions/{id}/fork - New session from the history up to a message.
pub async fn fork_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<ForkSessionRequest>,
) -> Result<Json<ForkResponse>> {
    let runtime = state
        .directory
        .fork(
            &session_id,
            &request.message_id,
            request.new_name.as_deref(),
        )
        .await?;
    let data = runtime.snapshot().await;
    Ok(Json(ForkResponse {
        summary: SessionSummary::from(&data),
        message_count: data.messages.len(),
    }))
}
