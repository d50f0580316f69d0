use std::path::Path;

use hierarchical_vector_db::embedding::EmbeddingSettings;
use hierarchical_vector_db::store::DistanceMetric;
use hierarchical_vector_db::{
    DatabaseConfig, ErrorKind, HierarchicalDatabase, HierarchyError, SearchRequest,
};
use tempfile::TempDir;

mod util;
use util::{TestTracing, math_tree};

fn persistent_config(dir: &Path) -> DatabaseConfig {
    DatabaseConfig {
        data_dir: dir.to_path_buf(),
        persist: true,
        metric: DistanceMetric::L2,
        embedding: EmbeddingSettings::Hash { dimension: 96 },
    }
}

fn level_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .filter(|name| name.ends_with(".hvc"))
        .collect();
    names.sort();
    names
}

#[test]
fn reopen_restores_levels_and_search() {
    let tmp = TempDir::new().unwrap();
    let config = persistent_config(tmp.path());

    {
        let mut db = HierarchicalDatabase::open(&config).unwrap();
        db.ingest(&math_tree()).unwrap();
        assert_eq!(db.max_level(), 4);
    }
    assert_eq!(
        level_files(tmp.path()),
        vec!["level_0.hvc", "level_1.hvc", "level_2.hvc", "level_3.hvc"]
    );

    let db = HierarchicalDatabase::open(&config).unwrap();
    assert_eq!(db.max_level(), 4);
    let counts: Vec<usize> = db.level_stats().unwrap().iter().map(|s| s.entries).collect();
    assert_eq!(counts, vec![1, 3, 6, 12]);

    let hits = db
        .search(&SearchRequest::new(
            ["Mathematics", "Calculus", "Differential Calculus", "Derivatives"],
            vec![2; 4],
            vec![1.0; 4],
        ))
        .unwrap();
    assert_eq!(hits[0].payload(), "The rate of change of a function.");
}

#[test]
fn clear_removes_collection_files() {
    let tmp = TempDir::new().unwrap();
    let config = persistent_config(tmp.path());

    let mut db = HierarchicalDatabase::open(&config).unwrap();
    db.ingest(&math_tree()).unwrap();
    db.clear().unwrap();
    assert!(level_files(tmp.path()).is_empty());
    drop(db);

    let db = HierarchicalDatabase::open(&config).unwrap();
    assert_eq!(db.max_level(), 0);
}

#[test]
fn orphaned_deep_level_is_ignored_on_load() {
    let tmp = TempDir::new().unwrap();
    let config = persistent_config(tmp.path());

    {
        let mut db = HierarchicalDatabase::open(&config).unwrap();
        db.ingest(&math_tree()).unwrap();
    }
    std::fs::remove_file(tmp.path().join("level_1.hvc")).unwrap();

    let tracing = TestTracing::new();
    let _guard = tracing.install();
    let db = HierarchicalDatabase::open(&config).unwrap();
    assert_eq!(db.max_level(), 1);
    tracing.assert_contains("ignoring level collections beyond a missing level");
}

#[test]
fn ephemeral_config_writes_nothing() {
    let tmp = TempDir::new().unwrap();
    let config = DatabaseConfig {
        persist: false,
        ..persistent_config(&tmp.path().join("never-created"))
    };

    let mut db = HierarchicalDatabase::open(&config).unwrap();
    db.ingest(&math_tree()).unwrap();
    assert_eq!(db.max_level(), 4);
    assert!(!tmp.path().join("never-created").exists());
}

#[test]
fn cosine_metric_persists_with_store() {
    let tmp = TempDir::new().unwrap();
    let config = DatabaseConfig {
        metric: DistanceMetric::Cosine,
        ..persistent_config(tmp.path())
    };
    let mut db = HierarchicalDatabase::open(&config).unwrap();
    db.ingest(&math_tree()).unwrap();
    assert_eq!(db.store().metric(), DistanceMetric::Cosine);

    let hits = db
        .search(
            &SearchRequest::new(["Mathematics", "Geometry"], vec![1, 1], vec![1.0, 1.0])
                .with_search_level(2),
        )
        .unwrap();
    assert_eq!(hits[0].label, "Geometry");
    assert!((hits[0].similarity - 2.0).abs() < 1e-4);
}

#[test]
fn reopening_under_another_metric_fails_before_search() {
    let tmp = TempDir::new().unwrap();
    let cosine = DatabaseConfig {
        metric: DistanceMetric::Cosine,
        ..persistent_config(tmp.path())
    };
    {
        let mut db = HierarchicalDatabase::open(&cosine).unwrap();
        db.ingest(&math_tree()).unwrap();
    }

    let err = HierarchicalDatabase::open(&persistent_config(tmp.path())).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(matches!(err, HierarchyError::Configuration(ref msg) if msg.contains("cosine")));

    let db = HierarchicalDatabase::open(&cosine).unwrap();
    assert_eq!(db.max_level(), 4);
}
