//! Database configuration.
//!
//! Configuration is stored in TOML at `~/.config/hvdb/config.toml` (or the
//! XDG equivalent). A missing file is not an error; defaults select the
//! offline hash embedder and a persistent store under the platform data
//! directory.
//!
//! # Example Configuration
//!
//! ```toml
//! data_dir = "data"
//! persist = true
//! metric = "l2"
//!
//! [embedding]
//! provider = "openai"
//! api_key = "sk-..."
//! api_base = "https://dashscope.aliyuncs.com/compatible-mode/v1"
//! model = "text-embedding-v3"
//! ```
//!
//! `HVDB_DATA_DIR`, `HVDB_EMBEDDING_API_KEY`, `HVDB_EMBEDDING_API_BASE` and
//! `HVDB_EMBEDDING_MODEL` override the file after it is parsed.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::embedding::EmbeddingSettings;
use crate::store::DistanceMetric;

pub const ENV_DATA_DIR: &str = "HVDB_DATA_DIR";
pub const ENV_API_KEY: &str = "HVDB_EMBEDDING_API_KEY";
pub const ENV_API_BASE: &str = "HVDB_EMBEDDING_API_BASE";
pub const ENV_MODEL: &str = "HVDB_EMBEDDING_MODEL";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Validation error: {0}")]
    Validation(String),
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|p| p.join("hvdb"))
        .unwrap_or_else(|| PathBuf::from("data"))
}

fn default_persist() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Directory holding one `level_N.hvc` file per level.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// `false` keeps everything in memory for the lifetime of the process.
    #[serde(default = "default_persist")]
    pub persist: bool,

    #[serde(default)]
    pub metric: DistanceMetric,

    #[serde(default)]
    pub embedding: EmbeddingSettings,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            persist: default_persist(),
            metric: DistanceMetric::default(),
            embedding: EmbeddingSettings::default(),
        }
    }
}

impl DatabaseConfig {
    /// In-memory configuration with the hash embedder.
    pub fn ephemeral() -> Self {
        Self {
            persist: false,
            ..Self::default()
        }
    }

    /// Load from the default location, falling back to defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    /// Load from `path`, apply environment overrides and validate.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str::<Self>(&content)?
        } else {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            Self::default()
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path.
    ///
    /// Uses XDG conventions:
    /// - Primary: `$XDG_CONFIG_HOME/hvdb/config.toml`
    /// - Fallback: platform-specific config dir
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        if let Ok(xdg_config) = dotenvy::var("XDG_CONFIG_HOME")
            && !xdg_config.is_empty()
        {
            return Ok(PathBuf::from(xdg_config).join("hvdb").join("config.toml"));
        }

        dirs::config_dir()
            .map(|p| p.join("hvdb").join("config.toml"))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Apply `HVDB_*` overrides from the process environment (and `.env`).
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| dotenvy::var(key).ok().filter(|v| !v.is_empty()));
    }

    /// Apply overrides from an arbitrary lookup. Overrides that do not apply
    /// to the selected provider are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup(ENV_DATA_DIR) {
            self.data_dir = PathBuf::from(dir);
        }

        let key = lookup(ENV_API_KEY);
        let base = lookup(ENV_API_BASE);
        let model_override = lookup(ENV_MODEL);
        match &mut self.embedding {
            EmbeddingSettings::OpenAi {
                api_key,
                api_base,
                model,
                ..
            }
            | EmbeddingSettings::Jina {
                api_key,
                api_base,
                model,
                ..
            } => {
                if let Some(key) = key {
                    *api_key = key;
                }
                if let Some(base) = base {
                    *api_base = base;
                }
                if let Some(m) = model_override {
                    *model = m;
                }
            }
            EmbeddingSettings::Ollama { url, model, .. } => {
                if let Some(base) = base {
                    *url = base;
                }
                if let Some(m) = model_override {
                    *model = m;
                }
            }
            EmbeddingSettings::Hash { .. } => {}
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.persist && self.data_dir.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "data_dir must not be empty when persist is enabled".into(),
            ));
        }
        self.embedding.validate().map_err(ConfigError::Validation)
    }
}
