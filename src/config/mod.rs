//! Configuration management for tutor

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::types::{Mode, ModelId};
use crate::core::DEFAULT_HISTORY_WINDOW;
use crate::llm::DEFAULT_BACKEND_URL;

/// Env var overriding `backend.base_url`
pub const BACKEND_URL_ENV: &str = "TUTOR_BACKEND_URL";
/// Env var overriding `storage.data_dir`
pub const DATA_DIR_ENV: &str = "TUTOR_DATA_DIR";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,
    pub chat: ChatConfig,
    pub reveal: RevealConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub base_url: String,
    /// Timeout in seconds for chat requests (local models can be slow)
    pub timeout_secs: u64,
    /// Endpoint path overrides keyed by model id; an empty path disables the model
    pub endpoints: BTreeMap<String, String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BACKEND_URL.to_string(),
            timeout_secs: 120,
            endpoints: BTreeMap::new(),
        }
    }
}

impl BackendConfig {
    /// Model -> endpoint path table with overrides applied
    pub fn endpoint_table(&self) -> HashMap<ModelId, String> {
        let mut table: HashMap<ModelId, String> = ModelId::ALL
            .into_iter()
            .map(|m| (m, m.default_endpoint().to_string()))
            .collect();
        for (key, path) in &self.endpoints {
            let Ok(model) = key.parse::<ModelId>() else {
                tracing::warn!("Ignoring endpoint override for unknown model '{}'", key);
                continue;
            };
            if path.trim().is_empty() {
                table.remove(&model);
            } else {
                table.insert(model, path.trim().to_string());
            }
        }
        table
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Mode selected when the client starts
    pub default_mode: Mode,
    /// Number of recent turns sent as context
    pub history_window: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            default_mode: Mode::Concepts,
            history_window: DEFAULT_HISTORY_WINDOW,
        }
    }
}

/// Per-character pauses of the reply reveal
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RevealConfig {
    pub enabled: bool,
    pub base_delay_ms: u64,
    pub whitespace_delay_ms: u64,
    pub clause_delay_ms: u64,
    pub sentence_delay_ms: u64,
}

impl Default for RevealConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_delay_ms: 12,
            whitespace_delay_ms: 24,
            clause_delay_ms: 90,
            sentence_delay_ms: 180,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding sessions.json (default: platform data dir)
    pub data_dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration from default location or create default
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        let mut config = if config_path.exists() {
            Self::load_from(&config_path)?
        } else {
            Config::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from an explicit file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "tutor") {
            let config_dir = proj_dirs.config_dir();
            std::fs::create_dir_all(config_dir)?;
            Ok(config_dir.join("config.toml"))
        } else {
            Ok(PathBuf::from("config.toml"))
        }
    }

    /// Apply `TUTOR_BACKEND_URL` and `TUTOR_DATA_DIR`
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(BACKEND_URL_ENV) {
            if !url.trim().is_empty() {
                self.backend.base_url = url.trim().to_string();
            }
        }
        if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
            if !dir.trim().is_empty() {
                self.storage.data_dir = Some(PathBuf::from(dir.trim()));
            }
        }
    }

    /// Resolved data directory
    pub fn data_dir(&self) -> PathBuf {
        self.storage
            .data_dir
            .clone()
            .unwrap_or_else(crate::storage::default_data_dir)
    }
}
