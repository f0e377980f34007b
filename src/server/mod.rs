pub mod router;
pub mod state;

use std::sync::Arc;

use crate::agent::{AgentRegistryHandle, FileAgentStore};
use crate::config::ChorusConfig;
use crate::directory::SessionDirectory;
use crate::dirs;
use crate::error::{ChorusError, Result};
use crate::llm::openai::OpenAiClient;
use crate::pool::InvocationPool;
use crate::runtime::RuntimeContext;
use crate::store::{FileSessionStore, SessionStore};

/// Wire the file-backed stores, the completion client and the worker pool
/// into handler state.
pub async fn build_state(config: ChorusConfig) -> Result<state::AppState> {
    dirs::ensure_dirs(&config.data_dir)?;

    let agent_store = FileAgentStore::new(config.agents_path());
    let registry = agent_store.load();
    tracing::info!(agents = ?registry.names(), "Loaded agent registry");

    let store = FileSessionStore::open(config.sessions_dir()).await?;
    tracing::info!(
        backend = store.backend_name(),
        dir = %store.dir().display(),
        "Session store opened"
    );
    let client = OpenAiClient::new(&config.llm).with_retry_config(config.retry.clone());
    tracing::info!(
        base_url = %config.llm.base_url,
        model = %config.llm.model,
        "Initialized completion client"
    );

    let ctx = RuntimeContext {
        store: Arc::new(store),
        agents: AgentRegistryHandle::new(registry),
        client: Arc::new(client),
        llm: config.llm.clone(),
    };
    let pool = InvocationPool::new(config.max_concurrent_invocations);

    Ok(state::AppState::new(
        Arc::new(SessionDirectory::new(ctx)),
        Arc::new(agent_store),
        pool,
        Arc::new(config),
    ))
}

/// Start the HTTP server with the given configuration.
pub async fn start(config: ChorusConfig) -> Result<()> {
    let bind_addr = config.bind_address();
    let app_state = build_state(config).await?;

    let app = router::build(app_state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| ChorusError::Server(format!("Failed to bind to {bind_addr}: {e}")))?;

    tracing::info!("Server listening on {bind_addr}");

    axum::serve(listener, app)
        .await
        .map_err(|e| ChorusError::Server(format!("Server error: {e}")))?;

    Ok(())
}
