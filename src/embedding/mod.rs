//! Embedder trait and types.
//!
//! Every level label and every search query goes through an [`Embedder`],
//! which is frankensearch's [`SyncEmbed`](frankensearch::SyncEmbed) trait.
//! Implementations are synchronous; remote providers block on HTTP and own
//! their own timeout and retry policy.
//!
//! # Implementations
//!
//! - **[`HashEmbedder`]**: frankensearch's FNV-1a feature hashing embedder
//!   (offline, deterministic)
//! - **[`remote`]**: OpenAI-compatible, Jina AI and Ollama HTTP APIs
//!
//! [`EmbeddingSettings`] is the closed set of providers a configuration can
//! name; [`EmbeddingSettings::build`] resolves it into a boxed embedder.

pub mod provider;
pub mod remote;

use std::fmt;

pub use frankensearch::HashEmbedder;
pub use frankensearch::SearchError as EmbedderError;
pub use frankensearch::SearchResult as EmbedderResult;
pub use frankensearch::SyncEmbed as Embedder;
pub use frankensearch::{ModelCategory, ModelTier};
pub use provider::EmbeddingSettings;
pub use remote::{ApiFlavor, HttpPolicy, HttpStatusError, RemoteEmbedder, http_status};

/// Default output dimension of the hash embedder.
pub const DEFAULT_HASH_DIMENSION: usize = 256;

/// An [`EmbedderError::EmbeddingFailed`] carrying a plain-text reason.
pub(crate) fn embedding_failed(model: &str, reason: impl Into<String>) -> EmbedderError {
    EmbedderError::EmbeddingFailed {
        model: model.to_string(),
        source: Box::new(std::io::Error::other(reason.into())),
    }
}

/// Metadata about an embedder for display and logging.
#[derive(Debug, Clone, serde::Serialize)]
pub struct EmbedderInfo {
    pub id: String,
    /// 0 while a remote provider has not answered yet.
    pub dimension: usize,
    pub is_semantic: bool,
}

impl EmbedderInfo {
    pub fn from_embedder(embedder: &dyn Embedder) -> Self {
        Self {
            id: embedder.id().to_string(),
            dimension: embedder.dimension(),
            is_semantic: embedder.is_semantic(),
        }
    }
}

impl fmt::Display for EmbedderInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_semantic {
            "semantic"
        } else {
            "lexical"
        };
        match self.dimension {
            0 => write!(f, "{} ({})", self.id, kind),
            dim => write!(f, "{} ({}, {} dims)", self.id, kind, dim),
        }
    }
}

/// Scale `embedding` to unit length. Non-finite or zero vectors become all
/// zeros so they cannot poison distance computations.
pub(crate) fn normalize_in_place(embedding: &mut [f32]) {
    let norm_sq: f32 = embedding.iter().map(|x| x * x).sum();
    if norm_sq.is_finite() && norm_sq > f32::EPSILON {
        let inv_norm = 1.0 / norm_sq.sqrt();
        for v in embedding.iter_mut() {
            *v *= inv_norm;
        }
    } else {
        embedding.fill(0.0);
    }
}
