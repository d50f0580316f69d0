//! Error taxonomy for the hierarchical database.
//!
//! Each layer has its own error enum ([`EmbedderError`], [`StoreError`],
//! [`ConfigError`], [`TreeError`]). [`HierarchyError`] is what the database
//! surface returns, and [`ErrorKind`] collapses it into the four categories
//! callers branch on.

use serde::Serialize;
use thiserror::Error;

use crate::config::ConfigError;
use crate::embedding::EmbedderError;
use crate::hierarchy::tree::TreeError;
use crate::store::StoreError;

/// Coarse error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Invalid input or configuration, detected before any I/O.
    Configuration,
    /// `search_level` exceeds the number of known levels.
    Range,
    /// Collection or entry missing.
    NotFound,
    /// Embedding provider or vector store call failed.
    Collaborator,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Configuration => write!(f, "configuration"),
            Self::Range => write!(f, "range"),
            Self::NotFound => write!(f, "not_found"),
            Self::Collaborator => write!(f, "collaborator"),
        }
    }
}

#[derive(Error, Debug)]
pub enum HierarchyError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("search level {search_level} is out of range, max level is {max_level}")]
    Range {
        search_level: usize,
        max_level: usize,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid tree: {0}")]
    InvalidTree(#[from] TreeError),

    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbedderError),

    #[error("vector store failed: {0}")]
    Store(StoreError),
}

impl HierarchyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) | Self::InvalidTree(_) => ErrorKind::Configuration,
            Self::Range { .. } => ErrorKind::Range,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Embedding(_) | Self::Store(_) => ErrorKind::Collaborator,
        }
    }

    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}

impl From<StoreError> for HierarchyError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::CollectionNotFound(name) => Self::NotFound(format!("collection {name}")),
            mismatch @ StoreError::MetricMismatch { .. } => Self::Configuration(format!(
                "{mismatch}; clear the data directory or use the original metric"
            )),
            other => Self::Store(other),
        }
    }
}

impl From<ConfigError> for HierarchyError {
    fn from(err: ConfigError) -> Self {
        Self::Configuration(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, HierarchyError>;
