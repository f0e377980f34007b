use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::dirs;
use crate::error::{ChorusError, Result};
use crate::llm::retry::RetryConfig;

/// Completion backend defaults shared by every agent without overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmDefaults {
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

impl Default for LlmDefaults {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_base_url(),
            model: default_model(),
            temperature: default_temperature(),
        }
    }
}

impl LlmDefaults {
    /// Apply `OPENAI_*` overrides. Empty values count as unset.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.is_empty());

        if let Some(key) = get("OPENAI_API_KEY") {
            self.api_key = key;
        }
        if let Some(url) = get("OPENAI_BASE_URL").or_else(|| get("OPENAI_API_BASE")) {
            self.base_url = url;
        }
        if let Some(model) = get("OPENAI_MODEL") {
            self.model = model;
        }
        if let Some(raw) = get("OPENAI_TEMPERATURE") {
            match raw.parse::<f32>() {
                Ok(t) => self.temperature = t,
                Err(_) => tracing::warn!(value = %raw, "Ignoring invalid OPENAI_TEMPERATURE"),
            }
        }
    }
}

/// User-configurable settings for the Chorus server and CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChorusConfig {
    /// Host address for the HTTP server (default: 127.0.0.1)
    #[serde(default = "default_host")]
    pub host: String,

    /// Port for the HTTP server (default: 8765)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Base directory for sessions and the agent registry
    #[serde(default = "dirs::chorus_home")]
    pub data_dir: PathBuf,

    /// Worker pool size for background agent invocations
    #[serde(default = "default_max_concurrent_invocations")]
    pub max_concurrent_invocations: usize,

    #[serde(default)]
    pub llm: LlmDefaults,

    #[serde(default = "default_retry")]
    pub retry: RetryConfig,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8765
}

fn default_max_concurrent_invocations() -> usize {
    8
}

fn default_retry() -> RetryConfig {
    RetryConfig {
        max_retries: 2,
        ..RetryConfig::default()
    }
}

impl Default for ChorusConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            data_dir: dirs::chorus_home(),
            max_concurrent_invocations: default_max_concurrent_invocations(),
            llm: LlmDefaults::default(),
            retry: default_retry(),
        }
    }
}

impl ChorusConfig {
    /// Load configuration from the default config file path, then apply
    /// environment overrides. Returns defaults if the file does not exist.
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();
        let mut config = Self::load_from(&dirs::config_path())?;
        config.llm.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Load configuration from an explicit file path without env overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| {
            ChorusError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        let config: ChorusConfig = toml::from_str(&content)?;
        if config.max_concurrent_invocations == 0 {
            return Err(ChorusError::Config(
                "max_concurrent_invocations must be at least 1".to_string(),
            ));
        }
        Ok(config)
    }

    /// Save the configuration to an explicit file path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the server bind address string (e.g., "127.0.0.1:8765").
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn sessions_dir(&self) -> PathBuf {
        dirs::sessions_dir(&self.data_dir)
    }

    pub fn agents_path(&self) -> PathBuf {
        dirs::agents_path(&self.data_dir)
    }
}
