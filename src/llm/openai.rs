//! OpenAI-compatible chat completions client
//!
//! Talks to `POST <base_url>/chat/completions`. Streaming replies are read
//! as server-sent events: `data: {json}` records separated by blank lines,
//! terminated by `data: [DONE]`.

use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;

use super::retry::{with_retry, AttemptOutcome, RetryConfig};
use super::{ChunkStream, CompletionClient, CompletionError, CompletionRequest};
use crate::config::LlmDefaults;

/// A string wrapper that redacts its value in Debug and Display output.
#[derive(Clone, Default)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Access the secret value (only for HTTP headers)
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SecretString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl std::fmt::Display for SecretString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

/// Resolve the completions endpoint for a base URL.
///
/// A trailing `#` disables path completion: the rest is used verbatim.
pub fn chat_completions_url(base_url: &str) -> String {
    if let Some(exact) = base_url.strip_suffix('#') {
        return exact.to_string();
    }
    format!("{}/chat/completions", base_url.trim_end_matches('/'))
}

/// OpenAI-compatible completion client
#[derive(Debug)]
pub struct OpenAiClient {
    api_key: SecretString,
    base_url: String,
    client: reqwest::Client,
    retry_config: RetryConfig,
}

impl OpenAiClient {
    pub fn new(defaults: &LlmDefaults) -> Self {
        Self {
            api_key: SecretString::new(defaults.api_key.clone()),
            base_url: defaults.base_url.clone(),
            client: reqwest::Client::new(),
            retry_config: RetryConfig::default(),
        }
    }

    pub fn with_retry_config(mut self, retry_config: RetryConfig) -> Self {
        self.retry_config = retry_config;
        self
    }

    fn request_body(request: &CompletionRequest) -> serde_json::Value {
        serde_json::json!({
            "model": request.model,
            "messages": request.messages,
            "temperature": request.temperature,
            "stream": request.stream,
        })
    }

    /// Send the request, retrying transient failures, and return the
    /// successful response with its body still unread.
    async fn send(&self, request: &CompletionRequest) -> Result<reqwest::Response, CompletionError> {
        let base_url = request
            .endpoint
            .base_url
            .as_deref()
            .unwrap_or(&self.base_url);
        let url = chat_completions_url(base_url);
        let api_key = match &request.endpoint.api_key {
            Some(key) => SecretString::new(key.clone()),
            None => self.api_key.clone(),
        };
        let body = Self::request_body(request);

        tracing::debug!(
            url = %url,
            model = %request.model,
            stream = request.stream,
            messages = request.messages.len(),
            "Sending completion request"
        );

        with_retry(&self.retry_config, |_attempt| {
            let url = &url;
            let api_key = &api_key;
            let body = &body;
            async move {
                let mut builder = self.client.post(url.as_str()).json(body);
                if !api_key.expose().is_empty() {
                    builder = builder.bearer_auth(api_key.expose());
                }
                match builder.send().await {
                    Ok(resp) if resp.status().is_success() => AttemptOutcome::Success(resp),
                    Ok(resp) => {
                        let status = resp.status();
                        let retry_after = RetryConfig::parse_retry_after(
                            resp.headers()
                                .get("retry-after")
                                .and_then(|v| v.to_str().ok()),
                        );
                        let body = resp.text().await.unwrap_or_default();
                        if self.retry_config.is_retryable_status(status) {
                            AttemptOutcome::Retryable {
                                status,
                                body,
                                retry_after,
                            }
                        } else {
                            AttemptOutcome::Fatal(CompletionError::from_status(
                                status.as_u16(),
                                body,
                            ))
                        }
                    }
                    Err(e) => AttemptOutcome::Fatal(CompletionError::Network(e.to_string())),
                }
            }
        })
        .await
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError> {
        let request = CompletionRequest {
            stream: false,
            ..request
        };
        let response = self.send(&request).await?;
        let body = response
            .text()
            .await
            .map_err(|e| CompletionError::Network(e.to_string()))?;
        parse_completion(&body)
    }

    async fn complete_streaming(
        &self,
        request: CompletionRequest,
    ) -> Result<ChunkStream, CompletionError> {
        let request = CompletionRequest {
            stream: true,
            ..request
        };
        let response = self.send(&request).await?;
        let mut bytes = response.bytes_stream();

        let stream = async_stream::stream! {
            let mut decoder = SseDecoder::default();
            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        yield Err(CompletionError::Network(e.to_string()));
                        return;
                    }
                };
                for item in decoder.push(&chunk) {
                    match item {
                        Ok(SseItem::Delta(text)) => yield Ok(text),
                        Ok(SseItem::Done) => return,
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

/// Extract the reply text from a non-streaming response body
pub fn parse_completion(body: &str) -> Result<String, CompletionError> {
    let response: CompletionResponse = serde_json::from_str(body)
        .map_err(|e| CompletionError::MalformedResponse(format!("{e}: {body}")))?;
    let choice = response.choices.into_iter().next().ok_or_else(|| {
        CompletionError::MalformedResponse("response contained no choices".to_string())
    })?;
    Ok(choice.message.content.unwrap_or_default())
}

/// Decoded server-sent event
#[derive(Debug, Clone, PartialEq)]
pub enum SseItem {
    Delta(String),
    Done,
}

/// Incremental SSE decoder
///
/// Buffers raw bytes so multi-byte characters split across network chunks
/// decode correctly.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    /// Feed a network chunk and return every complete event it finished
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<SseItem, CompletionError>> {
        self.buffer.extend(chunk.iter().filter(|b| **b != b'\r'));

        let mut items = Vec::new();
        while let Some(end) = find_event_end(&self.buffer) {
            let event: Vec<u8> = self.buffer.drain(..end + 2).collect();
            let event = String::from_utf8_lossy(&event[..end]);
            for line in event.lines() {
                let Some(data) = line.strip_prefix("data:") else {
                    continue;
                };
                let data = data.trim_start();
                if data == "[DONE]" {
                    items.push(Ok(SseItem::Done));
                    continue;
                }
                match serde_json::from_str::<StreamChunk>(data) {
                    Ok(chunk) => {
                        let delta = chunk
                            .choices
                            .into_iter()
                            .next()
                            .and_then(|c| c.delta)
                            .and_then(|d| d.content)
                            .filter(|c| !c.is_empty());
                        if let Some(text) = delta {
                            items.push(Ok(SseItem::Delta(text)));
                        }
                    }
                    Err(e) => items.push(Err(CompletionError::MalformedResponse(format!(
                        "{e}: {data}"
                    )))),
                }
            }
        }
        items
    }
}

fn find_event_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == b"\n\n")
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: Option<StreamDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}
