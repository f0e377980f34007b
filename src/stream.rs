//! Event bridge: runtime events to a streamed HTTP body
//!
//! Each request gets its own [`Subscription`] (an unbounded FIFO fed by the
//! runtime) and a background task. The body is a sequence of data-stream
//! records, one per line:
//!
//! ```text
//! 0:""
//! 2:[{"event":"session","data":{"session_id":"..."}}]
//! 2:[{"event":"stream_start","data":{"message_id":"...","speaker":"Dev"}}]
//! 2:[{"event":"stream_delta","data":{"message_id":"...","speaker":"Dev","content":"He"}}]
//! 2:[{"event":"stream_end","data":{"message_id":"...","speaker":"Dev","content":"Hello"}}]
//! 2:[{"event":"done","data":{}}]
//! ```
//!
//! The body ends only after the task has finished and every queued event
//! has been written.

use std::collections::HashMap;
use std::convert::Infallible;

use axum::body::Body;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use futures::Stream;
use serde_json::{json, Value};
use tokio::task::{JoinError, JoinHandle};

use crate::runtime::{ChatEvent, Subscription};

/// Record code opening the stream
pub const OPEN_CODE: &str = "0";

/// Record code carrying application events
pub const DATA_CODE: &str = "2";

/// Encode one `<code>:<json>\n` record
pub fn frame(code: &str, payload: &Value) -> String {
    format!("{}:{}\n", code, payload)
}

/// The stream-open record
pub fn open_frame() -> String {
    frame(OPEN_CODE, &Value::String(String::new()))
}

/// A data record carrying a single named event
pub fn event_frame(event: &str, data: Value) -> String {
    frame(DATA_CODE, &json!([{ "event": event, "data": data }]))
}

/// Assigns stream-scoped message ids to runtime events
///
/// A speaker's `stream_start` opens an id that its deltas and `stream_end`
/// reuse; `stream_end` closes it. Each `message` gets an id of its own.
#[derive(Debug)]
pub struct Correlator {
    session_id: String,
    open: HashMap<String, String>,
}

impl Correlator {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            open: HashMap::new(),
        }
    }

    fn fresh_id(&self, speaker: &str) -> String {
        format!(
            "{}:{}:{}",
            self.session_id,
            speaker,
            uuid::Uuid::new_v4().simple()
        )
    }

    /// Turns currently open
    pub fn open_turns(&self) -> usize {
        self.open.len()
    }

    /// Encode a runtime event with its correlation id
    pub fn encode(&mut self, event: &ChatEvent) -> String {
        match event {
            ChatEvent::StreamStart { speaker } => {
                let id = self.fresh_id(speaker);
                self.open.insert(speaker.clone(), id.clone());
                event_frame(
                    event.name(),
                    json!({ "message_id": id, "speaker": speaker }),
                )
            }
            ChatEvent::StreamDelta { speaker, delta } => {
                let id = match self.open.get(speaker) {
                    Some(id) => id.clone(),
                    None => {
                        let id = self.fresh_id(speaker);
                        self.open.insert(speaker.clone(), id.clone());
                        id
                    }
                };
                event_frame(
                    event.name(),
                    json!({ "message_id": id, "speaker": speaker, "content": delta }),
                )
            }
            ChatEvent::StreamEnd { speaker, content } => {
                let id = self
                    .open
                    .remove(speaker)
                    .unwrap_or_else(|| self.fresh_id(speaker));
                event_frame(
                    event.name(),
                    json!({ "message_id": id, "speaker": speaker, "content": content }),
                )
            }
            ChatEvent::Message { speaker, content } => {
                let id = self.fresh_id(speaker);
                event_frame(
                    event.name(),
                    json!({ "message_id": id, "speaker": speaker, "content": content }),
                )
            }
        }
    }
}

enum Step<T> {
    Event(ChatEvent),
    Finished(Result<T, JoinError>),
}

/// Bridge a subscription and its background task into body records.
///
/// `finish` receives the task outcome after the queue is drained and
/// returns the records to write before `done`.
pub fn event_stream<T, F>(
    session_id: String,
    mut subscription: Subscription,
    mut task: JoinHandle<T>,
    finish: F,
) -> impl Stream<Item = Result<String, Infallible>> + Send
where
    T: Send + 'static,
    F: FnOnce(Result<T, JoinError>, &mut Correlator) -> Vec<String> + Send + 'static,
{
    async_stream::stream! {
        let mut correlator = Correlator::new(session_id.clone());

        yield Ok(open_frame());
        yield Ok(event_frame("session", json!({ "session_id": session_id })));

        let outcome = loop {
            let step = tokio::select! {
                biased;
                Some(event) = subscription.recv() => Step::Event(event),
                joined = &mut task => Step::Finished(joined),
            };
            match step {
                Step::Event(event) => {
                    yield Ok(correlator.encode(&event));
                }
                Step::Finished(joined) => break joined,
            }
        };

        while let Some(event) = subscription.try_recv() {
            yield Ok(correlator.encode(&event));
        }

        for record in finish(outcome, &mut correlator) {
            yield Ok(record);
        }

        yield Ok(event_frame("done", json!({})));

        tracing::debug!(
            session_id = %session_id,
            listener = ?subscription.id(),
            "Event stream complete"
        );
        drop(subscription);
    }
}

/// Wrap a record stream as a `text/plain` streaming response
pub fn streaming_response<S>(records: S) -> Response
where
    S: Stream<Item = Result<String, Infallible>> + Send + 'static,
{
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(records),
    )
        .into_response()
}
