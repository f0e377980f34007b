use clap::Parser;
use tracing_subscriber::EnvFilter;

use a3s_chorus::cli::{Cli, Commands};
use a3s_chorus::config::ChorusConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = ChorusConfig::load()?;

    match cli.command {
        Commands::Serve { host, port } => {
            a3s_chorus::cli::serve::execute(config, host.as_deref(), port).await?;
        }
        Commands::Agents => {
            a3s_chorus::cli::agents::execute(&config)?;
        }
        Commands::Sessions => {
            a3s_chorus::cli::sessions::execute(&config).await?;
        }
    }

    Ok(())
}
