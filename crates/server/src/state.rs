use std::sync::Arc;

use tracing::info;

use oikos_core::Config;
use oikos_tool_runtime::{
    register_finance_tools, AgenticLoop, InMemoryHistoryStore, Ledger, ToolDispatcher, ToolRegistry,
};

pub struct AppState {
    pub agent: Arc<AgenticLoop>,
}

impl AppState {
    pub fn new(agent: Arc<AgenticLoop>) -> Self {
        Self { agent }
    }

    /// Wire the completion client, finance tools and history store from config.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let mut registry = ToolRegistry::new();
        register_finance_tools(&mut registry, Arc::new(Ledger::new()))?;
        info!(tools = registry.len(), "tool registry ready");

        let client = oikos_llm::create_client(&config.llm, &config.chat)?;
        let agent = AgenticLoop::new(
            Arc::new(client),
            Arc::new(ToolDispatcher::new(Arc::new(registry))),
            Arc::new(InMemoryHistoryStore::new()),
            config.chat.clone(),
        );
        Ok(Self::new(Arc::new(agent)))
    }
}
