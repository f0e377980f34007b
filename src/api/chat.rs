//! Streaming chat endpoints
//!
//! Both handlers subscribe to the session before submitting work to the
//! invocation pool, so no event can be emitted ahead of the subscription.
//! Dropping the response body (client disconnect) removes the listener but
//! leaves the background work running; its result is still persisted.

use axum::extract::State;
use axum::response::Response;
use axum::Json;
use serde_json::json;
use tokio::task::JoinError;

use crate::api::types::{InvokeRequest, MessageRequest};
use crate::error::{ChorusError, Result};
use crate::mention::parse_mentions;
use crate::prompt::validate_image;
use crate::runtime::ChatEvent;
use crate::server::state::AppState;
use crate::stream::{self, Correlator};
use crate::types::SYSTEM_SPEAKER;

/// Record for a background task that ended without a result
fn failure_record(
    session_id: &str,
    outcome: std::result::Result<ChorusError, JoinError>,
    correlator: &mut Correlator,
) -> String {
    let detail = match outcome {
        Ok(e) => e.to_string(),
        Err(e) if e.is_cancelled() => "invocation cancelled".to_string(),
        Err(e) => format!("invocation panicked: {e}"),
    };
    tracing::error!(session_id = %session_id, error = %detail, "Background chat task failed");
    correlator.encode(&ChatEvent::Message {
        speaker: SYSTEM_SPEAKER.to_string(),
        content: format!("[chat failed] {detail}"),
    })
}

/// POST /chat/data - Append a user message and stream every mentioned
/// agent's reply, in mention order.
pub async fn chat_handler(
    State(state): State<AppState>,
    Json(request): Json<MessageRequest>,
) -> Result<Response> {
    request.images.iter().try_for_each(|img| validate_image(img))?;

    let runtime = state
        .directory
        .get_or_create(request.session_id.as_deref())
        .await?;
    let registry = state.directory.agents().snapshot();
    let mentioned = parse_mentions(&request.message, &registry.names());
    let session_id = runtime.id().to_string();

    tracing::info!(
        session_id = %session_id,
        mentioned = ?mentioned,
        images = request.images.len(),
        "Chat message received"
    );

    let subscription = runtime.subscribe();
    let task = {
        let runtime = runtime.clone();
        state.pool.spawn(async move {
            runtime
                .chat(&request.message, request.images, &mentioned)
                .await
        })
    };

    let finish_id = session_id.clone();
    let records = stream::event_stream(
        session_id,
        subscription,
        task,
        move |outcome, correlator| {
            let mut records = Vec::new();
            let user_message_id = match outcome {
                Ok(Ok(id)) => Some(id),
                Ok(Err(e)) => {
                    records.push(failure_record(&finish_id, Ok(e), correlator));
                    None
                }
                Err(e) => {
                    records.push(failure_record(&finish_id, Err(e), correlator));
                    None
                }
            };
            records.push(stream::event_frame(
                "user_message_id",
                json!({ "message_id": user_message_id }),
            ));
            records
        },
    );

    Ok(stream::streaming_response(records))
}

/// POST /invoke - Stream one agent's turn against the current history.
pub async fn invoke_handler(
    State(state): State<AppState>,
    Json(request): Json<InvokeRequest>,
) -> Result<Response> {
    let runtime = state
        .directory
        .get_or_create(request.session_id.as_deref())
        .await?;
    let session_id = runtime.id().to_string();

    tracing::info!(session_id = %session_id, agent = %request.agent_name, "Direct invocation");

    let subscription = runtime.subscribe();
    let task = {
        let runtime = runtime.clone();
        state
            .pool
            .spawn(async move { runtime.invoke_agent(&request.agent_name).await })
    };

    let finish_id = session_id.clone();
    let records = stream::event_stream(
        session_id,
        subscription,
        task,
        move |outcome, correlator| match outcome {
            Ok(Ok(_)) => Vec::new(),
            Ok(Err(e)) => vec![failure_record(&finish_id, Ok(e), correlator)],
            Err(e) => vec![failure_record(&finish_id, Err(e), correlator)],
        },
    );

    Ok(stream::streaming_response(records))
}
