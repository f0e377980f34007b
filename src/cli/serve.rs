use crate::config::ChorusConfig;
use crate::error::Result;
use crate::server;

/// Execute the `serve` command: start the HTTP server.
pub async fn execute(config: ChorusConfig, host: Option<&str>, port: Option<u16>) -> Result<()> {
    let mut config = config;

    // CLI arguments win over config.toml
    if let Some(host) = host {
        config.host = host.to_string();
    }
    if let Some(port) = port {
        config.port = port;
    }

    println!("A3S Chorus server starting...");
    println!("Listening on http://{}:{}", config.host, config.port);
    println!("Data directory: {}", config.data_dir.display());
    println!("Press Ctrl+C to stop");

    server::start(config).await
}
