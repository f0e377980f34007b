use crate::agent::{AgentRegistry, FileAgentStore};
use crate::config::ChorusConfig;
use crate::error::Result;

/// Execute the `agents` command: display the agent registry.
pub fn execute(config: &ChorusConfig) -> Result<()> {
    let store = FileAgentStore::new(config.agents_path());
    let registry = store.load();
    print!("{}", render(&registry, &config.llm.model));
    Ok(())
}

fn render(registry: &AgentRegistry, default_model: &str) -> String {
    let mut out = format!("{:<24} {:<20} {:<8} STREAM\n", "NAME", "MODEL", "TEMP");
    for agent in registry.agents() {
        let model = agent.model.as_deref().unwrap_or(default_model);
        let temperature = agent
            .temperature
            .map(|t| format!("{t:.1}"))
            .unwrap_or_else(|| "-".to_string());
        out.push_str(&format!(
            "{:<24} {:<20} {:<8} {}\n",
            agent.name,
            model,
            temperature,
            if agent.stream { "yes" } else { "no" },
        ));
    }
    out.push_str(&format!("\n{} agent(s) total\n", registry.len()));
    out
}
