//! Fuzz target for config file loading.
//!
//! Tests that `DatabaseConfig::load_from` handles malformed TOML
//! gracefully, including unknown providers, wrong types and missing fields.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use std::fs;
use tempfile::TempDir;

use hierarchical_vector_db::DatabaseConfig;

#[derive(Arbitrary, Debug)]
struct ConfigInput {
    /// Raw TOML content
    toml_content: String,
    /// Whether to build the configured embedder after a successful load
    build_embedder: bool,
}

fuzz_target!(|input: ConfigInput| {
    let temp_dir = match TempDir::new() {
        Ok(dir) => dir,
        Err(_) => return,
    };

    let config_path = temp_dir.path().join("config.toml");
    if fs::write(&config_path, &input.toml_content).is_err() {
        return;
    }

    // Should never panic
    if let Ok(config) = DatabaseConfig::load_from(&config_path)
        && input.build_embedder
        && !config.embedding.is_remote()
    {
        let _ = config.embedding.build();
    }
});
