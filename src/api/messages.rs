use axum::extract::{Path, State};
use axum::Json;

use crate::api::types::{AddMessageResponse, MessageRequest, UpdateMessageRequest};
use crate::error::{ChorusError, Result};
use crate::prompt::validate_image;
use crate::server::state::AppState;
use crate::types::Message;

/// POST /message - Append a user message without invoking any agent.
pub async fn add_handler(
    State(state): State<AppState>,
    Json(request): Json<MessageRequest>,
) -> Result<Json<AddMessageResponse>> {
    request.images.iter().try_for_each(|img| validate_image(img))?;

    let runtime = state
        .directory
        .get_or_create(request.session_id.as_deref())
        .await?;
    let message_id = runtime
        .add_user_message(&request.message, request.images)
        .await?;
    let message_count = runtime.messages().await.len();

    Ok(Json(AddMessageResponse {
        status: "success".to_string(),
        session_id: runtime.id().to_string(),
        message_id,
        message_count,
    }))
}

/// GET /sessions/{id}/messages/{message_id}
pub async fn get_handler(
    State(state): State<AppState>,
    Path((session_id, message_id)): Path<(String, String)>,
) -> Result<Json<Message>> {
    let runtime = state.directory.require(&session_id).await?;
    let message = runtime.get_message(&message_id).await;
    message
        .map(Json)
        .ok_or(ChorusError::MessageNotFound(message_id))
}

/// PATCH /sessions/{id}/messages/{message_id} - Replace message content.
pub async fn update_handler(
    State(state): State<AppState>,
    Path((session_id, message_id)): Path<(String, String)>,
    Json(request): Json<UpdateMessageRequest>,
) -> Result<Json<serde_json::Value>> {
    let runtime = state.directory.require(&session_id).await?;
    if !runtime.update_message(&message_id, &request.content).await? {
        return Err(ChorusError::MessageNotFound(message_id));
    }
    Ok(Json(
        serde_json::json!({ "status": "success", "message_id": message_id }),
    ))
}

/// DELETE /sessions/{id}/messages/{message_id}
pub async fn delete_handler(
    State(state): State<AppState>,
    Path((session_id, message_id)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>> {
    let runtime = state.directory.require(&session_id).await?;
    if !runtime.delete_message(&message_id).await? {
        return Err(ChorusError::MessageNotFound(message_id));
    }
    Ok(Json(
        serde_json::json!({ "status": "success", "message_id": message_id }),
    ))
}
