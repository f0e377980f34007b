pub mod agents;
pub mod serve;
pub mod sessions;

use clap::{Parser, Subcommand};

/// A3S Chorus - Multi-agent group chat backend
#[derive(Debug, Parser)]
#[command(name = "a3s-chorus", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Start the HTTP server
    Serve {
        /// Host address to bind to (overrides config.toml)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides config.toml)
        #[arg(long)]
        port: Option<u16>,
    },

    /// List the configured agents
    Agents,

    /// List stored sessions, newest first
    Sessions,
}
