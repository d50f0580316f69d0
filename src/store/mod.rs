//! Vector store layer.
//!
//! A store holds named collections of [`Record`]s and answers
//! nearest-neighbor queries, optionally restricted by a [`MetadataFilter`].
//! Every collection carries an HNSW graph (`hnsw_rs`); small candidate sets
//! are scored exactly, larger ones are drawn from the graph and re-ranked.
//! The hierarchy keeps one collection per tree depth on top of this trait.
//!
//! - **[`memory`]**: ephemeral store, everything lives in process memory.
//! - **[`file`]**: persistent store, each collection mirrored to one
//!   MessagePack file in the data directory.

mod ann;
mod collection;
pub mod file;
pub mod memory;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use file::FileStore;
pub use memory::MemoryStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("collection not found: {0}")]
    CollectionNotFound(String),

    #[error("duplicate id {id} in collection {collection}")]
    DuplicateId { collection: String, id: String },

    #[error("dimension mismatch in collection {collection}: expected {expected}, got {actual}")]
    DimensionMismatch {
        collection: String,
        expected: usize,
        actual: usize,
    },

    #[error("invalid collection name: {0:?}")]
    InvalidName(String),

    #[error("collection file {path} was written with metric {stored}, store uses {configured}")]
    MetricMismatch {
        path: String,
        stored: DistanceMetric,
        configured: DistanceMetric,
    },

    #[error("corrupt collection file {path}: {reason}")]
    Corrupt { path: String, reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode collection: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("failed to decode collection {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: rmp_serde::decode::Error,
    },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Metadata stored alongside every vector.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMetadata {
    /// Id of the entry one level up; empty at depth 0.
    pub parent_id: String,
    pub depth: usize,
    /// Terminal payload; empty for internal entries. A leaf may carry an
    /// empty payload too.
    pub payload: String,
    #[serde(default)]
    pub leaf: bool,
}

impl EntryMetadata {
    pub fn is_leaf(&self) -> bool {
        self.leaf
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_empty()
    }
}

/// One row of a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub label: String,
    pub embedding: Vec<f32>,
    pub metadata: EntryMetadata,
}

/// One query result, nearest first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryHit {
    pub id: String,
    pub label: String,
    pub distance: f32,
    pub metadata: EntryMetadata,
}

/// Equality filters over [`EntryMetadata`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataFilter {
    ParentId(String),
}

impl MetadataFilter {
    pub fn matches(&self, metadata: &EntryMetadata) -> bool {
        match self {
            Self::ParentId(parent) => metadata.parent_id == *parent,
        }
    }
}

/// Distance function used by a store. Lower is closer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// Squared Euclidean distance.
    #[default]
    L2,
    /// `1 - cosine similarity`; zero vectors are at distance 1 from everything.
    Cosine,
    /// `1 - dot product`, floored at 0. Embedders normalize their output, so
    /// the floor only matters for hand-built vectors.
    InnerProduct,
}

impl DistanceMetric {
    pub fn distance(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Self::L2 => a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum(),
            Self::Cosine => {
                let dot = dot(a, b);
                let norms = dot_self(a).sqrt() * dot_self(b).sqrt();
                if norms <= f32::EPSILON {
                    1.0
                } else {
                    1.0 - dot / norms
                }
            }
            Self::InnerProduct => (1.0 - dot(a, b)).max(0.0),
        }
    }
}

impl std::fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::L2 => write!(f, "l2"),
            Self::Cosine => write!(f, "cosine"),
            Self::InnerProduct => write!(f, "inner_product"),
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn dot_self(a: &[f32]) -> f32 {
    dot(a, a)
}

/// Capability interface of a vector store.
///
/// All methods take `&self`; implementations synchronize internally so a
/// store can be queried from several threads at once.
pub trait VectorStore: Send + Sync {
    /// Names of every collection currently in the store.
    fn list_collections(&self) -> StoreResult<Vec<String>>;

    /// Create `name` if it does not exist. Returns `true` when it was created.
    fn create_collection(&self, name: &str) -> StoreResult<bool>;

    /// Remove `name` and all of its records.
    fn delete_collection(&self, name: &str) -> StoreResult<()>;

    /// Append records. The batch is rejected as a whole when any id already
    /// exists or any vector has the wrong dimension.
    fn add(&self, name: &str, records: Vec<Record>) -> StoreResult<()>;

    /// Up to `k` nearest records to `vector`, nearest first.
    fn query(
        &self,
        name: &str,
        vector: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> StoreResult<Vec<QueryHit>>;

    fn count(&self, name: &str) -> StoreResult<usize>;

    fn get(&self, name: &str, id: &str) -> StoreResult<Option<Record>>;

    /// Every record of `name` in insertion order.
    fn scan(&self, name: &str) -> StoreResult<Vec<Record>>;

    fn metric(&self) -> DistanceMetric;

    fn has_collection(&self, name: &str) -> StoreResult<bool> {
        Ok(self.list_collections()?.iter().any(|c| c == name))
    }
}
