//! Hierarchical database: per-depth collections over a [`VectorStore`].
//!
//! ```text
//! ingest(tree) ──► LevelCollections ──► level_0, level_1, ... ──► VectorStore
//! search(req)  ──► level_0 (unfiltered) ──► level_i (parent_id filter) ──► ranked hits
//! ```
//!
//! The database owns one [`Embedder`] used for both labels and queries.
//! Searches take `&self`; ingestion and clearing take `&mut self`.

pub mod ingest;
pub mod levels;
pub mod search;
pub mod tree;

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::config::DatabaseConfig;
use crate::embedding::{Embedder, EmbedderInfo};
use crate::error::Result;
use crate::store::{FileStore, MemoryStore, VectorStore};

pub use ingest::IngestReport;
pub use levels::{LevelCollections, LevelHandle, level_name};
pub use search::{SearchHit, SearchRequest, distance_to_similarity};
pub use tree::{Tree, TreeError, TreeValue};

/// Entry count of one level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LevelStats {
    pub depth: usize,
    pub name: String,
    pub entries: usize,
}

pub struct HierarchicalDatabase {
    levels: LevelCollections,
    embedder: Box<dyn Embedder>,
}

impl fmt::Debug for HierarchicalDatabase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HierarchicalDatabase")
            .field("levels", &self.levels)
            .field("embedder", &self.embedder.id())
            .finish()
    }
}

impl HierarchicalDatabase {
    /// Wrap `store`, recovering `max_level` from the collections it already
    /// holds.
    pub fn new(store: Arc<dyn VectorStore>, embedder: Box<dyn Embedder>) -> Result<Self> {
        let levels = LevelCollections::load(store)?;
        info!(
            embedder = embedder.id(),
            max_level = levels.max_level(),
            "opened hierarchical database"
        );
        Ok(Self { levels, embedder })
    }

    /// Empty database backed by a [`MemoryStore`].
    pub fn in_memory(embedder: Box<dyn Embedder>) -> Result<Self> {
        Self::new(Arc::new(MemoryStore::default()), embedder)
    }

    /// Build the embedder and store described by `config`.
    pub fn open(config: &DatabaseConfig) -> Result<Self> {
        config.validate()?;
        let embedder = config.embedding.build()?;
        let store: Arc<dyn VectorStore> = if config.persist {
            Arc::new(FileStore::open(&config.data_dir, config.metric)?)
        } else {
            Arc::new(MemoryStore::new(config.metric))
        };
        Self::new(store, embedder)
    }

    /// Number of levels, one past the deepest collection.
    pub fn max_level(&self) -> usize {
        self.levels.max_level()
    }

    /// Depth `tree` would occupy once ingested.
    pub fn depth_of(tree: &Tree) -> usize {
        tree.depth()
    }

    pub fn ingest(&mut self, tree: &Tree) -> Result<IngestReport> {
        ingest::ingest(&mut self.levels, self.embedder.as_ref(), tree)
    }

    /// Convenience for [`HierarchicalDatabase::ingest`] on a JSON object.
    pub fn ingest_json(&mut self, value: &serde_json::Value) -> Result<IngestReport> {
        let tree = Tree::from_json_value(value)?;
        self.ingest(&tree)
    }

    pub fn search(&self, request: &SearchRequest) -> Result<Vec<SearchHit>> {
        search::hierarchical_search(&self.levels, self.embedder.as_ref(), request)
    }

    /// Delete every level collection and reset `max_level` to 0.
    pub fn clear(&mut self) -> Result<()> {
        let before = self.levels.max_level();
        self.levels.clear_all()?;
        info!(levels = before, "cleared hierarchical database");
        Ok(())
    }

    pub fn level(&self, depth: usize) -> Result<LevelHandle<'_>> {
        self.levels.get(depth)
    }

    pub fn level_stats(&self) -> Result<Vec<LevelStats>> {
        (0..self.levels.max_level())
            .map(|depth| {
                let handle = self.levels.get(depth)?;
                Ok(LevelStats {
                    depth,
                    name: handle.name().to_string(),
                    entries: handle.count()?,
                })
            })
            .collect()
    }

    pub fn embedder_info(&self) -> EmbedderInfo {
        EmbedderInfo::from_embedder(self.embedder.as_ref())
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        self.levels.store()
    }
}
