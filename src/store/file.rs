//! Persistent vector store.
//!
//! Every collection is kept in memory and mirrored to
//! `{dir}/{name}.hvc`. A mutation is written to disk first and applied in
//! memory only once the file is in place, so a failed write leaves both
//! views unchanged. The file is written to a temp file in the same directory
//! and renamed over the old one, so a crash leaves either the previous or
//! the new contents on disk.
//!
//! File layout:
//! - Magic: `"HVDC"` (4 bytes)
//! - Version: u16 little-endian
//! - Collection body: MessagePack (named fields) via `rmp-serde`, including
//!   the distance metric the collection was built with

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use super::collection::Collection;
use super::memory::MemoryStore;
use super::{
    DistanceMetric, MetadataFilter, QueryHit, Record, StoreError, StoreResult, VectorStore,
};

/// Magic bytes at the start of every collection file.
pub const COLLECTION_MAGIC: [u8; 4] = *b"HVDC";

/// Collection file format version. Version 2 added the metric.
pub const COLLECTION_VERSION: u16 = 2;

/// Extension of collection files inside the data directory.
pub const COLLECTION_EXT: &str = "hvc";

const HEADER_LEN: usize = 6;

/// Path of the file backing collection `name`.
pub fn collection_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.{COLLECTION_EXT}"))
}

#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    inner: MemoryStore,
}

impl FileStore {
    /// Open (or create) a store rooted at `dir`, loading every collection
    /// file found there. Fails with [`StoreError::MetricMismatch`] when a
    /// file was written under a different metric.
    pub fn open(dir: &Path, metric: DistanceMetric) -> StoreResult<Self> {
        fs::create_dir_all(dir)?;

        let mut collections = HashMap::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if !path.is_file() || path.extension().is_none_or(|ext| ext != COLLECTION_EXT) {
                continue;
            }
            let collection = read_collection(&path)?;
            if collection.metric() != metric {
                return Err(StoreError::MetricMismatch {
                    path: path.display().to_string(),
                    stored: collection.metric(),
                    configured: metric,
                });
            }
            tracing::debug!(
                path = %path.display(),
                collection = collection.name(),
                entries = collection.len(),
                "loaded collection file"
            );
            collections.insert(collection.name().to_string(), collection);
        }

        tracing::info!(dir = %dir.display(), collections = collections.len(), "opened file store");
        Ok(Self {
            dir: dir.to_path_buf(),
            inner: MemoryStore::from_collections(collections, metric),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

fn write_collection_file(dir: &Path, name: &str, body: &[u8]) -> StoreResult<()> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(&COLLECTION_MAGIC)?;
    tmp.write_all(&COLLECTION_VERSION.to_le_bytes())?;
    tmp.write_all(body)?;
    tmp.as_file().sync_all()?;

    let path = collection_path(dir, name);
    tmp.persist(&path).map_err(|e| StoreError::Io(e.error))?;
    Ok(())
}

fn validate_name(name: &str) -> StoreResult<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidName(name.to_string()))
    }
}

fn read_collection(path: &Path) -> StoreResult<Collection> {
    let bytes = fs::read(path)?;
    let corrupt = |reason: String| StoreError::Corrupt {
        path: path.display().to_string(),
        reason,
    };

    if bytes.len() < HEADER_LEN {
        return Err(corrupt(format!("file too short ({} bytes)", bytes.len())));
    }
    if bytes[..4] != COLLECTION_MAGIC {
        return Err(corrupt(format!("invalid magic: {:?}", &bytes[..4])));
    }
    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if version != COLLECTION_VERSION {
        return Err(corrupt(format!("unsupported version: {version}")));
    }

    let mut collection: Collection =
        rmp_serde::from_slice(&bytes[HEADER_LEN..]).map_err(|source| StoreError::Decode {
            path: path.display().to_string(),
            source,
        })?;
    collection.rebuild_indexes();
    Ok(collection)
}

impl VectorStore for FileStore {
    fn list_collections(&self) -> StoreResult<Vec<String>> {
        self.inner.list_collections()
    }

    fn create_collection(&self, name: &str) -> StoreResult<bool> {
        validate_name(name)?;
        if self.inner.has_collection(name)? {
            return Ok(false);
        }
        let collection = Collection::new(name, self.inner.metric());
        write_collection_file(&self.dir, name, &collection.encode()?)?;
        Ok(self.inner.insert_collection(collection))
    }

    fn delete_collection(&self, name: &str) -> StoreResult<()> {
        if !self.inner.has_collection(name)? {
            return Err(StoreError::CollectionNotFound(name.to_string()));
        }
        let path = collection_path(&self.dir, name);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        self.inner.delete_collection(name)
    }

    fn add(&self, name: &str, records: Vec<Record>) -> StoreResult<()> {
        self.inner.with_collection_mut(name, |collection| -> StoreResult<()> {
            let dimension = collection.check(&records)?;
            let body = collection.encode_with(dimension, &records)?;
            write_collection_file(&self.dir, name, &body)?;
            collection.commit(records, dimension);
            Ok(())
        })?
    }

    fn query(
        &self,
        name: &str,
        vector: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> StoreResult<Vec<QueryHit>> {
        self.inner.query(name, vector, k, filter)
    }

    fn count(&self, name: &str) -> StoreResult<usize> {
        self.inner.count(name)
    }

    fn get(&self, name: &str, id: &str) -> StoreResult<Option<Record>> {
        self.inner.get(name, id)
    }

    fn scan(&self, name: &str) -> StoreResult<Vec<Record>> {
        self.inner.scan(name)
    }

    fn metric(&self) -> DistanceMetric {
        self.inner.metric()
    }

    fn has_collection(&self, name: &str) -> StoreResult<bool> {
        self.inner.has_collection(name)
    }
}
