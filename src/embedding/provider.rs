//! Closed set of embedding providers a configuration can select.

use serde::{Deserialize, Serialize};

use super::remote::{
    DEFAULT_MAX_RETRIES, DEFAULT_TIMEOUT_SECS, HttpPolicy, JINA_DEFAULT_BASE, OLLAMA_DEFAULT_URL,
    OPENAI_DEFAULT_BASE, RemoteEmbedder,
};
use super::{DEFAULT_HASH_DIMENSION, Embedder, EmbedderResult, HashEmbedder};

fn default_openai_base() -> String {
    OPENAI_DEFAULT_BASE.to_string()
}

fn default_jina_base() -> String {
    JINA_DEFAULT_BASE.to_string()
}

fn default_ollama_url() -> String {
    OLLAMA_DEFAULT_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_dimension() -> usize {
    DEFAULT_HASH_DIMENSION
}

/// Embedding provider selection, tagged by `provider` in config files.
///
/// ```toml
/// [embedding]
/// provider = "ollama"
/// url = "http://localhost:11434"
/// model = "nomic-embed-text"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum EmbeddingSettings {
    /// Any OpenAI-compatible `/embeddings` endpoint.
    #[serde(rename = "openai")]
    OpenAi {
        api_key: String,
        #[serde(default = "default_openai_base")]
        api_base: String,
        model: String,
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
        #[serde(default = "default_max_retries")]
        max_retries: u32,
    },
    Jina {
        api_key: String,
        #[serde(default = "default_jina_base")]
        api_base: String,
        model: String,
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
        #[serde(default = "default_max_retries")]
        max_retries: u32,
    },
    Ollama {
        #[serde(default = "default_ollama_url")]
        url: String,
        model: String,
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
        #[serde(default = "default_max_retries")]
        max_retries: u32,
    },
    /// Offline feature hashing.
    Hash {
        #[serde(default = "default_dimension")]
        dimension: usize,
    },
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self::Hash {
            dimension: DEFAULT_HASH_DIMENSION,
        }
    }
}

impl EmbeddingSettings {
    pub fn provider_name(&self) -> &'static str {
        match self {
            Self::OpenAi { .. } => "openai",
            Self::Jina { .. } => "jina",
            Self::Ollama { .. } => "ollama",
            Self::Hash { .. } => "hash",
        }
    }

    pub fn is_remote(&self) -> bool {
        !matches!(self, Self::Hash { .. })
    }

    /// Field-level checks, returning a human-readable reason on failure.
    pub fn validate(&self) -> Result<(), String> {
        let require = |field: &str, value: &str| {
            if value.trim().is_empty() {
                Err(format!(
                    "embedding provider {} requires a non-empty {field}",
                    self.provider_name()
                ))
            } else {
                Ok(())
            }
        };
        let positive_timeout = |timeout_secs: u64| {
            if timeout_secs == 0 {
                Err("embedding timeout_secs must be positive".to_string())
            } else {
                Ok(())
            }
        };

        match self {
            Self::OpenAi {
                api_key,
                api_base,
                model,
                timeout_secs,
                ..
            }
            | Self::Jina {
                api_key,
                api_base,
                model,
                timeout_secs,
                ..
            } => {
                require("api_key", api_key)?;
                require("api_base", api_base)?;
                require("model", model)?;
                positive_timeout(*timeout_secs)
            }
            Self::Ollama {
                url,
                model,
                timeout_secs,
                ..
            } => {
                require("url", url)?;
                require("model", model)?;
                positive_timeout(*timeout_secs)
            }
            Self::Hash { dimension } => {
                if *dimension == 0 {
                    Err("hash embedding dimension must be positive".to_string())
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Resolve the selection into a ready embedder.
    pub fn build(&self) -> EmbedderResult<Box<dyn Embedder>> {
        let embedder: Box<dyn Embedder> = match self {
            Self::OpenAi {
                api_key,
                api_base,
                model,
                timeout_secs,
                max_retries,
            } => Box::new(RemoteEmbedder::openai(
                api_key,
                api_base,
                model,
                HttpPolicy::new(*timeout_secs, *max_retries),
            )?),
            Self::Jina {
                api_key,
                api_base,
                model,
                timeout_secs,
                max_retries,
            } => Box::new(RemoteEmbedder::jina(
                api_key,
                api_base,
                model,
                HttpPolicy::new(*timeout_secs, *max_retries),
            )?),
            Self::Ollama {
                url,
                model,
                timeout_secs,
                max_retries,
            } => Box::new(RemoteEmbedder::ollama(
                url,
                model,
                HttpPolicy::new(*timeout_secs, *max_retries),
            )?),
            Self::Hash { dimension } => Box::new(HashEmbedder::new(*dimension)),
        };
        tracing::debug!(
            provider = self.provider_name(),
            embedder = embedder.id(),
            "built embedder"
        );
        Ok(embedder)
    }
}
