use std::sync::Arc;

use crate::agent::FileAgentStore;
use crate::config::ChorusConfig;
use crate::directory::SessionDirectory;
use crate::pool::InvocationPool;

/// Shared application state accessible to all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub directory: Arc<SessionDirectory>,
    pub agent_store: Arc<FileAgentStore>,
    pub pool: InvocationPool,
    pub config: Arc<ChorusConfig>,
}

impl AppState {
    pub fn new(
        directory: Arc<SessionDirectory>,
        agent_store: Arc<FileAgentStore>,
        pool: InvocationPool,
        config: Arc<ChorusConfig>,
    ) -> Self {
        Self {
            directory,
            agent_store,
            pool,
            config,
        }
    }
}
