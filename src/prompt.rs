//! Prompt construction
//!
//! Turns a session history into the role/content list for one agent. The
//! target agent's own turns replay as `assistant`; everyone else's replay as
//! `user` prefixed with `[speaker]: ` so the model can tell participants
//! apart.

use base64::Engine;

use crate::agent::AgentDefinition;
use crate::config::LlmDefaults;
use crate::error::{ChorusError, Result};
use crate::llm::{
    ChatMessage, CompletionRequest, ContentPart, Endpoint, ImageUrl, MessageContent, Role,
};
use crate::types::SessionData;

const GLOBAL_CONTEXT_HEADER: &str = "[Session global context]:";

/// System prompt for `agent`, with the session's global prompt appended
pub fn system_prompt(agent: &AgentDefinition, global_prompt: &str) -> String {
    if global_prompt.is_empty() {
        agent.system_prompt.clone()
    } else {
        format!(
            "{}\n\n{}\n{}",
            agent.system_prompt, GLOBAL_CONTEXT_HEADER, global_prompt
        )
    }
}

/// Image payload as a URL: `data:` URIs pass through, bare base64 is
/// wrapped as PNG.
pub fn image_url(image: &str) -> String {
    if image.starts_with("data:") {
        image.to_string()
    } else {
        format!("data:image/png;base64,{image}")
    }
}

/// Reject image payloads that are neither `data:` URIs nor valid base64
pub fn validate_image(image: &str) -> Result<()> {
    if image.starts_with("data:") {
        return Ok(());
    }
    base64::engine::general_purpose::STANDARD
        .decode(image.trim())
        .map(|_| ())
        .map_err(|e| ChorusError::Validation(format!("invalid image payload: {e}")))
}

/// Ordered completion messages for `agent` over `session`'s history
pub fn build_messages(agent: &AgentDefinition, session: &SessionData) -> Vec<ChatMessage> {
    let mut out = Vec::with_capacity(session.messages.len() + 1);
    out.push(ChatMessage::text(
        Role::System,
        system_prompt(agent, &session.global_prompt),
    ));

    for msg in &session.messages {
        let own = msg.speaker == agent.name;
        let role = if own { Role::Assistant } else { Role::User };
        let text = if own {
            msg.content.clone()
        } else {
            format!("[{}]: {}", msg.speaker, msg.content)
        };

        let content = if msg.images.is_empty() {
            MessageContent::Text(text)
        } else {
            let mut parts = Vec::with_capacity(msg.images.len() + 1);
            if !msg.content.is_empty() {
                parts.push(ContentPart::Text { text });
            }
            parts.extend(msg.images.iter().map(|img| ContentPart::ImageUrl {
                image_url: ImageUrl { url: image_url(img) },
            }));
            MessageContent::Parts(parts)
        };

        out.push(ChatMessage { role, content });
    }
    out
}

/// Full completion request for `agent`, applying its overrides on top of
/// the backend defaults.
pub fn build_request(
    agent: &AgentDefinition,
    session: &SessionData,
    defaults: &LlmDefaults,
) -> CompletionRequest {
    CompletionRequest {
        model: agent
            .model
            .clone()
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| defaults.model.clone()),
        messages: build_messages(agent, session),
        temperature: agent.temperature.unwrap_or(defaults.temperature),
        stream: agent.stream,
        endpoint: Endpoint {
            base_url: agent.base_url.clone().filter(|u| !u.is_empty()),
            api_key: agent.api_key.clone().filter(|k| !k.is_empty()),
        },
    }
}
