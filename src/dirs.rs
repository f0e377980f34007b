use std::path::{Path, PathBuf};

/// Returns the base directory for Chorus data.
///
/// Uses `$A3S_CHORUS_HOME` if set, otherwise defaults to `~/.a3s/chorus`.
pub fn chorus_home() -> PathBuf {
    if let Ok(home) = std::env::var("A3S_CHORUS_HOME") {
        return PathBuf::from(home);
    }

    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".a3s")
        .join("chorus")
}

/// Returns the path to the user configuration file.
pub fn config_path() -> PathBuf {
    chorus_home().join("config.toml")
}

/// Directory holding one JSON document per session plus the index.
pub fn sessions_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("sessions")
}

/// Path of the agent registry document.
pub fn agents_path(data_dir: &Path) -> PathBuf {
    data_dir.join("agents.json")
}

/// Ensure all required directories under `data_dir` exist.
pub fn ensure_dirs(data_dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(sessions_dir(data_dir))?;
    Ok(())
}
