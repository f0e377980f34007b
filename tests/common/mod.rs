//! Shared fixtures: a scripted completion backend and directory builders.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use a3s_chorus::config::LlmDefaults;
use a3s_chorus::llm::{ChunkStream, CompletionClient, CompletionError, CompletionRequest};
use a3s_chorus::{
    AgentDefinition, AgentRegistry, AgentRegistryHandle, MemorySessionStore, RuntimeContext,
    SessionDirectory,
};
use tokio::sync::Notify;

/// One scripted backend reply
#[derive(Clone)]
pub enum Script {
    /// Reply in these chunks (joined for non-streaming calls)
    Reply(Vec<&'static str>),
    /// Stream these chunks, then fail
    FailAfter(Vec<&'static str>, CompletionError),
    /// Fail before producing anything
    Fail(CompletionError),
    /// Wait for the gate, then reply
    Gated(Arc<Notify>, Vec<&'static str>),
}

/// Completion backend replaying scripts keyed by model name
#[derive(Default)]
pub struct ScriptedClient {
    scripts: Mutex<HashMap<String, VecDeque<Script>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, model: &str, script: Script) {
        self.scripts
            .lock()
            .unwrap()
            .entry(model.to_string())
            .or_default()
            .push_back(script);
    }

    /// Requests received so far, in arrival order
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn next(&self, request: &CompletionRequest) -> Script {
        self.requests.lock().unwrap().push(request.clone());
        self.scripts
            .lock()
            .unwrap()
            .get_mut(&request.model)
            .and_then(|q| q.pop_front())
            .unwrap_or(Script::Reply(vec!["ok"]))
    }
}

#[async_trait::async_trait]
impl CompletionClient for ScriptedClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError> {
        match self.next(&request) {
            Script::Reply(chunks) | Script::FailAfter(chunks, _) => Ok(chunks.concat()),
            Script::Fail(e) => Err(e),
            Script::Gated(gate, chunks) => {
                gate.notified().await;
                Ok(chunks.concat())
            }
        }
    }

    async fn complete_streaming(
        &self,
        request: CompletionRequest,
    ) -> Result<ChunkStream, CompletionError> {
        let items: Vec<Result<String, CompletionError>> = match self.next(&request) {
            Script::Reply(chunks) => chunks.into_iter().map(|c| Ok(c.to_string())).collect(),
            Script::FailAfter(chunks, e) => chunks
                .into_iter()
                .map(|c| Ok(c.to_string()))
                .chain(std::iter::once(Err(e)))
                .collect(),
            Script::Fail(e) => return Err(e),
            Script::Gated(gate, chunks) => {
                gate.notified().await;
                chunks.into_iter().map(|c| Ok(c.to_string())).collect()
            }
        };
        Ok(Box::pin(futures::stream::iter(items)))
    }
}

/// Agent whose requests are routed to the scripts for `model`
pub fn agent(name: &str, model: &str) -> AgentDefinition {
    AgentDefinition {
        model: Some(model.to_string()),
        ..AgentDefinition::new(name, format!("You are {name}."))
    }
}

pub fn default_roster() -> Vec<AgentDefinition> {
    vec![
        agent("Dev", "dev"),
        agent("PM", "pm"),
        AgentDefinition {
            stream: false,
            ..agent("Critic", "critic")
        },
    ]
}

pub struct Fixture {
    pub client: Arc<ScriptedClient>,
    pub store: Arc<MemorySessionStore>,
    pub agents: AgentRegistryHandle,
    pub directory: Arc<SessionDirectory>,
}

pub fn fixture_with(agents: Vec<AgentDefinition>) -> Fixture {
    let client = ScriptedClient::new();
    let store = Arc::new(MemorySessionStore::new());
    let agents = AgentRegistryHandle::new(AgentRegistry::new(agents).unwrap());
    let directory = Arc::new(SessionDirectory::new(RuntimeContext {
        store: store.clone(),
        agents: agents.clone(),
        client: client.clone(),
        llm: LlmDefaults::default(),
    }));
    Fixture {
        client,
        store,
        agents,
        directory,
    }
}

pub fn fixture() -> Fixture {
    fixture_with(default_roster())
}

/// Split a streamed body into `(code, payload)` records
pub fn parse_records(body: &str) -> Vec<(String, serde_json::Value)> {
    body.lines()
        .filter(|l| !l.is_empty())
        .map(|line| {
            let (code, payload) = line.split_once(':').expect("record has a code");
            (
                code.to_string(),
                serde_json::from_str(payload).expect("payload is json"),
            )
        })
        .collect()
}

/// Event names of the `2:` records, in order
pub fn event_names(records: &[(String, serde_json::Value)]) -> Vec<String> {
    records
        .iter()
        .filter(|(code, _)| code == "2")
        .map(|(_, v)| v[0]["event"].as_str().unwrap_or_default().to_string())
        .collect()
}

/// `data` object of the first event named `name`
pub fn event_data<'a>(
    records: &'a [(String, serde_json::Value)],
    name: &str,
) -> Option<&'a serde_json::Value> {
    records
        .iter()
        .filter(|(code, _)| code == "2")
        .map(|(_, v)| &v[0])
        .find(|e| e["event"] == name)
        .map(|e| &e["data"])
}
