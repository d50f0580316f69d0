//! Fuzz target for level collection files.
//!
//! Opening a data directory holding a corrupt `.hvc` file must fail with an
//! error rather than panic.

#![no_main]

use libfuzzer_sys::fuzz_target;
use std::fs;
use tempfile::TempDir;

use hierarchical_vector_db::store::{DistanceMetric, FileStore, VectorStore};

fuzz_target!(|data: &[u8]| {
    let temp_dir = match TempDir::new() {
        Ok(dir) => dir,
        Err(_) => return,
    };
    if fs::write(temp_dir.path().join("level_0.hvc"), data).is_err() {
        return;
    }

    if let Ok(store) = FileStore::open(temp_dir.path(), DistanceMetric::L2) {
        for name in store.list_collections().unwrap_or_default() {
            let _ = store.query(&name, &[0.0; 4], 3, None);
        }
    }
});
