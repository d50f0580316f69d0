//! One vector collection per tree depth.
//!
//! Collections are named `level_{depth}` and kept dense: when `level_k`
//! exists, so does every `level_j` with `j < k`. `max_level` is the number
//! of levels, i.e. one past the deepest existing collection.

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::{HierarchyError, Result};
use crate::store::{MetadataFilter, QueryHit, Record, StoreResult, VectorStore};

const LEVEL_PREFIX: &str = "level_";

/// Collection name for `depth`.
pub fn level_name(depth: usize) -> String {
    format!("{LEVEL_PREFIX}{depth}")
}

/// Inverse of [`level_name`]. Only canonical names (`level_7`, not
/// `level_07`) parse.
pub fn parse_level_name(name: &str) -> Option<usize> {
    let digits = name.strip_prefix(LEVEL_PREFIX)?;
    let depth: usize = digits.parse().ok()?;
    (digits == depth.to_string()).then_some(depth)
}

pub struct LevelCollections {
    store: Arc<dyn VectorStore>,
    max_level: usize,
}

impl std::fmt::Debug for LevelCollections {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LevelCollections")
            .field("max_level", &self.max_level)
            .field("metric", &self.store.metric())
            .finish()
    }
}

impl LevelCollections {
    /// Recover state from `store` by probing `level_0, level_1, ...` until
    /// one is missing.
    pub fn load(store: Arc<dyn VectorStore>) -> Result<Self> {
        let existing = store.list_collections()?;
        let mut max_level = 0;
        while existing.iter().any(|name| *name == level_name(max_level)) {
            max_level += 1;
        }

        let orphans: Vec<&String> = existing
            .iter()
            .filter(|name| parse_level_name(name).is_some_and(|d| d > max_level))
            .collect();
        if !orphans.is_empty() {
            warn!(
                max_level,
                orphans = ?orphans,
                "ignoring level collections beyond a missing level"
            );
        }

        info!(max_level, "loaded level collections");
        Ok(Self { store, max_level })
    }

    pub fn max_level(&self) -> usize {
        self.max_level
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    /// Collection for `depth`, creating it and any missing shallower level.
    pub fn ensure(&mut self, depth: usize) -> Result<LevelHandle<'_>> {
        for d in self.max_level..=depth {
            let name = level_name(d);
            if self.store.create_collection(&name)? {
                info!(level = d, collection = %name, "created level collection");
            }
            self.max_level = d + 1;
        }
        self.get(depth)
    }

    /// Handle for an existing level, `NotFound` past `max_level`.
    pub fn get(&self, depth: usize) -> Result<LevelHandle<'_>> {
        if depth >= self.max_level {
            return Err(HierarchyError::NotFound(format!(
                "level {depth} (max level is {})",
                self.max_level
            )));
        }
        Ok(LevelHandle {
            depth,
            name: level_name(depth),
            store: self.store.as_ref(),
        })
    }

    /// Drop the deepest level. Any other depth would leave a gap.
    pub fn delete(&mut self, depth: usize) -> Result<()> {
        if depth >= self.max_level {
            return Err(HierarchyError::NotFound(format!("level {depth}")));
        }
        if depth + 1 != self.max_level {
            return Err(HierarchyError::config(format!(
                "only the deepest level ({}) can be deleted, got {depth}",
                self.max_level - 1
            )));
        }

        let name = level_name(depth);
        self.store.delete_collection(&name)?;
        self.max_level = depth;
        info!(level = depth, collection = %name, "deleted level collection");
        Ok(())
    }

    /// Delete every level, deepest first, and reset `max_level` to 0.
    pub fn clear_all(&mut self) -> Result<()> {
        while self.max_level > 0 {
            self.delete(self.max_level - 1)?;
        }
        Ok(())
    }
}

/// Borrowed view of one level collection.
#[derive(Clone)]
pub struct LevelHandle<'a> {
    depth: usize,
    name: String,
    store: &'a dyn VectorStore,
}

impl std::fmt::Debug for LevelHandle<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LevelHandle")
            .field("depth", &self.depth)
            .field("name", &self.name)
            .finish()
    }
}

impl LevelHandle<'_> {
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add(&self, records: Vec<Record>) -> StoreResult<()> {
        self.store.add(&self.name, records)
    }

    /// Nearest `k` entries, restricted to children of `parent` when given.
    pub fn query(
        &self,
        vector: &[f32],
        k: usize,
        parent: Option<&str>,
    ) -> StoreResult<Vec<QueryHit>> {
        let filter = parent.map(|p| MetadataFilter::ParentId(p.to_string()));
        self.store.query(&self.name, vector, k, filter.as_ref())
    }

    pub fn count(&self) -> StoreResult<usize> {
        self.store.count(&self.name)
    }

    pub fn get(&self, id: &str) -> StoreResult<Option<Record>> {
        self.store.get(&self.name, id)
    }

    pub fn scan(&self) -> StoreResult<Vec<Record>> {
        self.store.scan(&self.name)
    }
}
