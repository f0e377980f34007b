use crate::config::ChorusConfig;
use crate::error::Result;
use crate::store::{FileSessionStore, SessionStore};

/// Execute the `sessions` command: display the session index.
pub async fn execute(config: &ChorusConfig) -> Result<()> {
    let store = FileSessionStore::open(config.sessions_dir()).await?;
    let sessions = store.list_index().await?;

    if sessions.is_empty() {
        println!("No sessions found in {}.", store.dir().display());
        return Ok(());
    }

    println!("{:<34} {:<28} {:<10} CREATED", "ID", "NAME", "MESSAGES");
    for entry in &sessions {
        let created = chrono::DateTime::from_timestamp_millis((entry.created_at * 1000.0) as i64)
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<34} {:<28} {:<10} {}",
            entry.id, entry.name, entry.message_count, created,
        );
    }

    println!("\n{} session(s) total", sessions.len());
    Ok(())
}
