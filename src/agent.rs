//! Agent registry
//!
//! Agents are personas: a unique name (the @mention token and the speaker
//! identity in history), a system prompt and optional backend overrides.
//! The registry is immutable once built; hot reload swaps the whole
//! registry behind an [`AgentRegistryHandle`], so a request that took a
//! snapshot keeps seeing the version it started with.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use serde::{Deserialize, Serialize};

use crate::error::{ChorusError, Result};

/// One agent persona
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDefinition {
    pub name: String,

    pub system_prompt: String,

    /// Display-only avatar for clients
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Endpoint override; a trailing `#` disables path completion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Stream the reply token by token (default: true)
    #[serde(default = "default_stream")]
    pub stream: bool,
}

fn default_stream() -> bool {
    true
}

impl AgentDefinition {
    pub fn new(name: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            system_prompt: system_prompt.into(),
            avatar_url: None,
            model: None,
            temperature: None,
            base_url: None,
            api_key: None,
            stream: true,
        }
    }
}

/// Ordered, name-indexed set of agents
#[derive(Debug, Clone, Default)]
pub struct AgentRegistry {
    agents: Vec<AgentDefinition>,
    index: HashMap<String, usize>,
}

impl AgentRegistry {
    /// Build a registry, rejecting empty or duplicate names
    pub fn new(agents: Vec<AgentDefinition>) -> Result<Self> {
        let mut index = HashMap::with_capacity(agents.len());
        for (i, agent) in agents.iter().enumerate() {
            if agent.name.trim().is_empty() {
                return Err(ChorusError::Validation(
                    "agent name must not be empty".to_string(),
                ));
            }
            if index.insert(agent.name.clone(), i).is_some() {
                return Err(ChorusError::Validation(format!(
                    "duplicate agent name: {}",
                    agent.name
                )));
            }
        }
        Ok(Self { agents, index })
    }

    pub fn get(&self, name: &str) -> Option<&AgentDefinition> {
        self.index.get(name).map(|&i| &self.agents[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Agent names in registry order
    pub fn names(&self) -> Vec<&str> {
        self.agents.iter().map(|a| a.name.as_str()).collect()
    }

    pub fn agents(&self) -> &[AgentDefinition] {
        &self.agents
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

/// Shared, atomically swappable registry reference
#[derive(Debug, Clone, Default)]
pub struct AgentRegistryHandle {
    inner: Arc<RwLock<Arc<AgentRegistry>>>,
}

impl AgentRegistryHandle {
    pub fn new(registry: AgentRegistry) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(registry))),
        }
    }

    /// Current registry version. Later swaps do not affect the snapshot.
    pub fn snapshot(&self) -> Arc<AgentRegistry> {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Replace the registry wholesale
    pub fn replace(&self, registry: AgentRegistry) {
        let registry = Arc::new(registry);
        match self.inner.write() {
            Ok(mut guard) => *guard = registry,
            Err(poisoned) => *poisoned.into_inner() = registry,
        }
    }
}

/// Built-in personas used when no registry document exists
pub fn default_agents() -> Vec<AgentDefinition> {
    vec![
        AgentDefinition {
            avatar_url: Some(
                "https://api.dicebear.com/9.x/notionists-neutral/svg?seed=pm".to_string(),
            ),
            temperature: Some(0.6),
            ..AgentDefinition::new(
                "ProductManager",
                "You are an experienced product manager who breaks down requirements, \
                 defines the MVP and proposes practical product plans. Keep your points \
                 structured and focused on user value and scope control.",
            )
        },
        AgentDefinition {
            avatar_url: Some(
                "https://api.dicebear.com/9.x/notionists-neutral/svg?seed=dev".to_string(),
            ),
            temperature: Some(0.4),
            ..AgentDefinition::new(
                "Engineer",
                "You are a hands-on full-stack engineer who cares about maintainability, \
                 edge cases and testability. Be concrete: give an implementation path \
                 and the pitfalls to watch for.",
            )
        },
        AgentDefinition {
            avatar_url: Some(
                "https://api.dicebear.com/9.x/notionists-neutral/svg?seed=critic".to_string(),
            ),
            temperature: Some(0.8),
            ..AgentDefinition::new(
                "Critic",
                "You are a sharp-tongued bystander who hunts for logical gaps, boundary \
                 conditions and risks. Be blunt but constructive.",
            )
        },
    ]
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AgentsDocument {
    Wrapped { agents: Vec<AgentDefinition> },
    Bare(Vec<AgentDefinition>),
}

#[derive(Serialize)]
struct AgentsDocumentRef<'a> {
    agents: &'a [AgentDefinition],
}

/// `agents.json` persistence
#[derive(Debug)]
pub struct FileAgentStore {
    path: PathBuf,
    /// Serializes document writes and the registry swaps that follow them
    write_lock: Mutex<()>,
}

impl FileAgentStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the registry document.
    ///
    /// Accepts `{"agents": [...]}` or a bare list. A missing, unreadable or
    /// invalid document falls back to [`default_agents`].
    pub fn load(&self) -> AgentRegistry {
        match self.try_load() {
            Ok(Some(registry)) => {
                tracing::info!(
                    path = %self.path.display(),
                    count = registry.len(),
                    "Loaded agent registry"
                );
                registry
            }
            Ok(None) => {
                tracing::info!(path = %self.path.display(), "No agent registry, using defaults");
                Self::defaults()
            }
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to load agent registry, using defaults"
                );
                Self::defaults()
            }
        }
    }

    fn try_load(&self) -> Result<Option<AgentRegistry>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)?;
        let agents = match serde_json::from_str::<AgentsDocument>(&content)? {
            AgentsDocument::Wrapped { agents } | AgentsDocument::Bare(agents) => agents,
        };
        AgentRegistry::new(agents).map(Some)
    }

    fn defaults() -> AgentRegistry {
        AgentRegistry::new(default_agents()).unwrap_or_default()
    }

    fn lock_writes(&self) -> MutexGuard<'_, ()> {
        self.write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Rewrite the document atomically (temp file + rename)
    pub fn save(&self, registry: &AgentRegistry) -> Result<()> {
        let _writer = self.lock_writes();
        self.write_document(registry)
    }

    /// Rewrite the document, then make `registry` live on `handle`.
    ///
    /// Concurrent callers run one at a time, so the file and the live
    /// registry always hold the same version. A failed write leaves the
    /// live registry untouched.
    pub fn save_and_swap(&self, registry: AgentRegistry, handle: &AgentRegistryHandle) -> Result<()> {
        let _writer = self.lock_writes();
        self.write_document(&registry)?;
        handle.replace(registry);
        Ok(())
    }

    fn write_document(&self, registry: &AgentRegistry) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let doc = AgentsDocumentRef {
            agents: registry.agents(),
        };
        let json = serde_json::to_string_pretty(&doc)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
