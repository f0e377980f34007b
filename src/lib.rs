//! # a3s-chorus
//!
//! Multi-agent group chat backend for the A3S ecosystem.
//!
//! ## Overview
//!
//! A session holds an ordered message history shared by a human and any
//! number of agent personas. Mentioning `@Agent` in a message runs that
//! agent against the history and streams its reply token by token, over a
//! single HTTP response, while the reply is appended to the session.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use a3s_chorus::agent::{default_agents, AgentRegistry, AgentRegistryHandle};
//! use a3s_chorus::config::LlmDefaults;
//! use a3s_chorus::llm::openai::OpenAiClient;
//! use a3s_chorus::store::MemorySessionStore;
//! use a3s_chorus::{RuntimeContext, SessionDirectory};
//!
//! # async fn example() -> a3s_chorus::Result<()> {
//! let llm = LlmDefaults::default();
//! let directory = SessionDirectory::new(RuntimeContext {
//!     store: Arc::new(MemorySessionStore::new()),
//!     agents: AgentRegistryHandle::new(AgentRegistry::new(default_agents())?),
//!     client: Arc::new(OpenAiClient::new(&llm)),
//!     llm,
//! });
//!
//! let session = directory.create(Some("Launch plan"), "be terse").await?;
//! let mut events = session.subscribe();
//! session
//!     .chat("@Engineer how long?", vec![], &["Engineer".to_string()])
//!     .await?;
//! while let Some(event) = events.try_recv() {
//!     println!("{} {}", event.name(), event.speaker());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **SessionRuntime** - one session's history, agent invocation and
//!   event fan-out
//! - **stream** - per-request bridge from runtime events to a streamed body
//! - **SessionDirectory** - lazy-loading id to runtime map (create, fork,
//!   delete)
//! - **SessionStore** - whole-document persistence (file or memory)
//! - **CompletionClient** - chat-completion backend (OpenAI-compatible)
//! - **AgentRegistryHandle** - hot-swappable agent personas

pub mod agent;
pub mod api;
pub mod cli;
pub mod config;
pub mod directory;
pub mod dirs;
pub mod error;
pub mod llm;
pub mod mention;
pub mod pool;
pub mod prompt;
pub mod runtime;
pub mod server;
pub mod store;
pub mod stream;
pub mod types;

// Re-export core types
pub use agent::{AgentDefinition, AgentRegistry, AgentRegistryHandle};
pub use directory::SessionDirectory;
pub use error::{ChorusError, Result};
pub use runtime::{ChatEvent, EventListener, RuntimeContext, SessionRuntime, Subscription};
pub use store::{FileSessionStore, MemorySessionStore, SessionStore};
pub use types::{Message, SessionData, SessionIndexEntry};
