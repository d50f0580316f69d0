//! Hierarchical vector database.
//!
//! Nested taxonomies are stored as one vector collection per tree depth and
//! searched top-down: each level only considers children of the candidates
//! kept at the level above, and scores accumulate along the path.
//!
//! ```no_run
//! use hierarchical_vector_db::{HierarchicalDatabase, SearchRequest, embedding::HashEmbedder};
//! use serde_json::json;
//!
//! let mut db = HierarchicalDatabase::in_memory(Box::new(HashEmbedder::default()))?;
//! db.ingest_json(&json!({"Calculus": {"Derivatives": "rate of change"}}))?;
//! let hits = db.search(&SearchRequest::new(
//!     ["Calculus", "Derivatives"],
//!     vec![1, 1],
//!     vec![1.0, 1.0],
//! ))?;
//! assert_eq!(hits[0].payload(), "rate of change");
//! # Ok::<(), hierarchical_vector_db::HierarchyError>(())
//! ```

pub mod config;
pub mod embedding;
pub mod error;
pub mod hierarchy;
pub mod logging;
pub mod store;
pub mod template;

use std::io::Write;
use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};
use colored::Colorize;
use serde::Serialize;
use serde_json::json;

pub use config::DatabaseConfig;
pub use error::{ErrorKind, HierarchyError, Result};
pub use hierarchy::{
    HierarchicalDatabase, IngestReport, LevelStats, SearchHit, SearchRequest, Tree, TreeValue,
};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "hvdb",
    version,
    about = "Hierarchical vector index: ingest nested taxonomies, search them level by level"
)]
pub struct Cli {
    /// Config file (defaults to $XDG_CONFIG_HOME/hvdb/config.toml)
    #[arg(long, global = true, env = "HVDB_CONFIG")]
    pub config: Option<PathBuf>,

    /// Machine-readable JSON output, including errors
    #[arg(long, global = true, visible_alias = "robot")]
    pub json: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Also append logs to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Ingest a JSON tree into the level collections
    Ingest {
        /// JSON object to ingest
        file: PathBuf,

        /// Clear every level before ingesting
        #[arg(long)]
        overwrite: bool,
    },

    /// Search level by level, one query per level
    Search {
        /// Query per level, shallowest first
        #[arg(short = 'q', long = "query", required = true, num_args = 1..)]
        queries: Vec<String>,

        /// Results kept per level (defaults to 1 for every level)
        #[arg(short = 'k', long = "top-k", num_args = 1..)]
        top_k: Vec<usize>,

        /// Score weight per level (defaults to 1.0 for every level)
        #[arg(short = 'w', long = "weight", num_args = 1.., allow_negative_numbers = true)]
        weights: Vec<f32>,

        /// Number of levels to descend (defaults to every level)
        #[arg(long)]
        levels: Option<usize>,

        /// Number of results to return
        #[arg(long, default_value_t = 1)]
        limit: usize,
    },

    /// Show the number of levels and entries per level
    Stats,

    /// Delete every level collection
    Clear,

    /// Reshape a template library into an ingestible tree
    Format {
        /// Raw template library (JSON)
        input: PathBuf,

        /// Output file; prints to stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Failure surfaced by the binary, printed as JSON in robot mode.
#[derive(Debug, Clone, Serialize)]
pub struct CliError {
    pub code: i32,
    pub kind: &'static str,
    pub message: String,
    pub hint: Option<String>,
    pub retryable: bool,
}

impl CliError {
    pub fn usage(message: impl Into<String>) -> Self {
        Self {
            code: 2,
            kind: "usage",
            message: message.into(),
            hint: Some("run `hvdb --help` for usage".into()),
            retryable: false,
        }
    }

    /// JSON payload written to stderr in robot mode.
    pub fn to_json(&self) -> serde_json::Value {
        json!({ "error": self })
    }
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(hint) = &self.hint {
            write!(f, "\nhint: {hint}")?;
        }
        Ok(())
    }
}

impl From<HierarchyError> for CliError {
    fn from(err: HierarchyError) -> Self {
        let kind = err.kind();
        let (code, hint, retryable) = match kind {
            ErrorKind::Configuration => (
                2,
                Some("check the config file and the search arguments"),
                false,
            ),
            ErrorKind::Range => (
                3,
                Some("run `hvdb stats` to see how many levels exist"),
                false,
            ),
            ErrorKind::NotFound => (4, Some("ingest a tree first"), false),
            ErrorKind::Collaborator => (
                5,
                Some("check the embedding provider and the data directory"),
                true,
            ),
        };
        let kind = match kind {
            ErrorKind::Configuration => "configuration",
            ErrorKind::Range => "range",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Collaborator => "collaborator",
        };
        Self {
            code,
            kind,
            message: err.to_string(),
            hint: hint.map(str::to_string),
            retryable,
        }
    }
}

impl From<config::ConfigError> for CliError {
    fn from(err: config::ConfigError) -> Self {
        HierarchyError::from(err).into()
    }
}

impl From<template::TemplateError> for CliError {
    fn from(err: template::TemplateError) -> Self {
        match err {
            template::TemplateError::Io { .. } => Self {
                code: 1,
                kind: "io",
                message: err.to_string(),
                hint: None,
                retryable: false,
            },
            other => Self {
                code: 2,
                kind: "configuration",
                message: other.to_string(),
                hint: Some("the template library must be a JSON object".into()),
                retryable: false,
            },
        }
    }
}

impl From<anyhow::Error> for CliError {
    fn from(err: anyhow::Error) -> Self {
        Self {
            code: 1,
            kind: "internal",
            message: format!("{err:#}"),
            hint: None,
            retryable: false,
        }
    }
}

pub type CliResult<T = ()> = std::result::Result<T, CliError>;

fn load_config(cli: &Cli) -> CliResult<DatabaseConfig> {
    let config = match &cli.config {
        Some(path) => DatabaseConfig::load_from(path)?,
        None => DatabaseConfig::load()?,
    };
    tracing::debug!(
        provider = config.embedding.provider_name(),
        data_dir = %config.data_dir.display(),
        persist = config.persist,
        "loaded configuration"
    );
    Ok(config)
}

fn open_database(cli: &Cli) -> CliResult<HierarchicalDatabase> {
    let config = load_config(cli)?;
    Ok(HierarchicalDatabase::open(&config)?)
}

fn emit_json<T: Serialize>(value: &T) -> CliResult {
    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value).map_err(anyhow::Error::from)?;
    writeln!(stdout).map_err(anyhow::Error::from)?;
    Ok(())
}

fn print_levels(stats: &[LevelStats]) {
    for level in stats {
        println!("Level {}: {} nodes", level.depth, level.entries);
    }
}

fn run_ingest(cli: &Cli, file: &std::path::Path, overwrite: bool) -> CliResult {
    let mut db = open_database(cli)?;
    if overwrite {
        db.clear()?;
        if !cli.json {
            println!("{}", "Database cleared.".yellow());
        }
    }

    let tree = Tree::from_path(file).map_err(|err| match err {
        hierarchy::TreeError::Io { .. } => CliError {
            code: 1,
            kind: "io",
            message: err.to_string(),
            hint: None,
            retryable: false,
        },
        other => HierarchyError::from(other).into(),
    })?;
    let report = db.ingest(&tree)?;
    let stats = db.level_stats()?;

    if cli.json {
        return emit_json(&json!({
            "file": file.display().to_string(),
            "ingested": report,
            "levels": stats,
        }));
    }
    println!(
        "{} {} entries from {}",
        "Ingested".green().bold(),
        report.total(),
        file.display()
    );
    print_levels(&stats);
    Ok(())
}

fn run_search(
    cli: &Cli,
    queries: &[String],
    top_k: &[usize],
    weights: &[f32],
    levels: Option<usize>,
    limit: usize,
) -> CliResult {
    let db = open_database(cli)?;
    let top_k = if top_k.is_empty() {
        vec![1; queries.len()]
    } else {
        top_k.to_vec()
    };
    let weights = if weights.is_empty() {
        vec![1.0; queries.len()]
    } else {
        weights.to_vec()
    };

    let mut request = SearchRequest::new(queries.iter().cloned(), top_k, weights)
        .with_final_count(limit);
    request.search_level = levels;
    let hits = db.search(&request)?;

    if cli.json {
        return emit_json(&json!({ "count": hits.len(), "hits": hits }));
    }
    if hits.is_empty() {
        println!("{}", "No results.".dimmed());
        return Ok(());
    }
    for (rank, hit) in hits.iter().enumerate() {
        println!(
            "{}. {}  {} {:.4}  {} {}",
            rank + 1,
            hit.label.bold(),
            "score".dimmed(),
            hit.similarity,
            "depth".dimmed(),
            hit.depth
        );
        if !hit.payload().is_empty() {
            println!("   {}", hit.payload());
        }
    }
    Ok(())
}

fn run_stats(cli: &Cli) -> CliResult {
    let db = open_database(cli)?;
    let stats = db.level_stats()?;
    let info = db.embedder_info();

    if cli.json {
        return emit_json(&json!({
            "max_level": db.max_level(),
            "embedder": info,
            "metric": db.store().metric(),
            "levels": stats,
        }));
    }
    println!("{} {}", "Max level:".bold(), db.max_level());
    println!("{} {}", "Embedder:".bold(), info);
    println!("{} {}", "Metric:".bold(), db.store().metric());
    print_levels(&stats);
    Ok(())
}

fn run_clear(cli: &Cli) -> CliResult {
    let mut db = open_database(cli)?;
    let levels = db.max_level();
    db.clear()?;
    if cli.json {
        return emit_json(&json!({ "cleared_levels": levels }));
    }
    println!("{} {} levels", "Cleared".green().bold(), levels);
    Ok(())
}

fn run_format(cli: &Cli, input: &std::path::Path, output: Option<&std::path::Path>) -> CliResult {
    match output {
        Some(out) => {
            let formatted = template::format_library_file(input, out)?;
            let groups = formatted.as_object().map_or(0, |m| m.len());
            if cli.json {
                return emit_json(&json!({
                    "input": input.display().to_string(),
                    "output": out.display().to_string(),
                    "top_level_entries": groups,
                }));
            }
            println!(
                "{} {} -> {}",
                "Formatted".green().bold(),
                input.display(),
                out.display()
            );
            Ok(())
        }
        None => {
            let text = std::fs::read_to_string(input).map_err(|source| {
                template::TemplateError::Io {
                    path: input.display().to_string(),
                    source,
                }
            })?;
            let raw: serde_json::Value =
                serde_json::from_str(&text).map_err(template::TemplateError::from)?;
            emit_json(&template::format_library(&raw)?)
        }
    }
}

/// Execute a parsed command line.
pub fn run(cli: &Cli) -> CliResult {
    match &cli.command {
        Commands::Ingest { file, overwrite } => run_ingest(cli, file, *overwrite),
        Commands::Search {
            queries,
            top_k,
            weights,
            levels,
            limit,
        } => run_search(cli, queries, top_k, weights, *levels, *limit),
        Commands::Stats => run_stats(cli),
        Commands::Clear => run_clear(cli),
        Commands::Format { input, output } => run_format(cli, input, output.as_deref()),
    }
}
