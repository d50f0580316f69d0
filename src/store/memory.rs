//! In-process vector store.

use std::collections::HashMap;

use parking_lot::RwLock;

use super::collection::Collection;
use super::{
    DistanceMetric, MetadataFilter, QueryHit, Record, StoreError, StoreResult, VectorStore,
};

/// Ephemeral store: collections vanish with the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Collection>>,
    metric: DistanceMetric,
}

impl MemoryStore {
    pub fn new(metric: DistanceMetric) -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            metric,
        }
    }

    pub(crate) fn from_collections(
        collections: HashMap<String, Collection>,
        metric: DistanceMetric,
    ) -> Self {
        Self {
            collections: RwLock::new(collections),
            metric,
        }
    }

    /// Run `f` against one collection under the read lock.
    pub(crate) fn with_collection<R>(
        &self,
        name: &str,
        f: impl FnOnce(&Collection) -> R,
    ) -> StoreResult<R> {
        let guard = self.collections.read();
        let collection = guard
            .get(name)
            .ok_or_else(|| StoreError::CollectionNotFound(name.to_string()))?;
        Ok(f(collection))
    }

    /// Run `f` against one collection under the write lock.
    pub(crate) fn with_collection_mut<R>(
        &self,
        name: &str,
        f: impl FnOnce(&mut Collection) -> R,
    ) -> StoreResult<R> {
        let mut guard = self.collections.write();
        let collection = guard
            .get_mut(name)
            .ok_or_else(|| StoreError::CollectionNotFound(name.to_string()))?;
        Ok(f(collection))
    }

    /// Insert a fully built collection unless the name is taken.
    pub(crate) fn insert_collection(&self, collection: Collection) -> bool {
        let mut guard = self.collections.write();
        if guard.contains_key(collection.name()) {
            return false;
        }
        guard.insert(collection.name().to_string(), collection);
        true
    }
}

impl VectorStore for MemoryStore {
    fn list_collections(&self) -> StoreResult<Vec<String>> {
        let mut names: Vec<String> = self.collections.read().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn create_collection(&self, name: &str) -> StoreResult<bool> {
        Ok(self.insert_collection(Collection::new(name, self.metric)))
    }

    fn delete_collection(&self, name: &str) -> StoreResult<()> {
        self.collections
            .write()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StoreError::CollectionNotFound(name.to_string()))
    }

    fn add(&self, name: &str, records: Vec<Record>) -> StoreResult<()> {
        self.with_collection_mut(name, |c| c.add(records))?
    }

    fn query(
        &self,
        name: &str,
        vector: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> StoreResult<Vec<QueryHit>> {
        self.with_collection(name, |c| c.query(vector, k, filter))?
    }

    fn count(&self, name: &str) -> StoreResult<usize> {
        self.with_collection(name, Collection::len)
    }

    fn get(&self, name: &str, id: &str) -> StoreResult<Option<Record>> {
        self.with_collection(name, |c| c.get(id).cloned())
    }

    fn scan(&self, name: &str) -> StoreResult<Vec<Record>> {
        self.with_collection(name, |c| c.records().to_vec())
    }

    fn metric(&self) -> DistanceMetric {
        self.metric
    }

    fn has_collection(&self, name: &str) -> StoreResult<bool> {
        Ok(self.collections.read().contains_key(name))
    }
}
