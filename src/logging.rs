//! Subscriber setup for the `hvdb` binary.

use std::io::IsTerminal;
use std::path::Path;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Checked before `RUST_LOG`.
pub const LOG_ENV: &str = "HVDB_LOG";

/// Default directive for a `-v` count when no env filter is set.
pub fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    }
}

/// Filter from `HVDB_LOG`, then `RUST_LOG`, then the verbosity default.
pub fn build_filter(verbosity: u8) -> EnvFilter {
    let from_env = dotenvy::var(LOG_ENV)
        .or_else(|_| dotenvy::var("RUST_LOG"))
        .ok()
        .filter(|s| !s.trim().is_empty());

    match from_env {
        Some(directives) => EnvFilter::try_new(&directives).unwrap_or_else(|err| {
            eprintln!("ignoring invalid log filter {directives:?}: {err}");
            EnvFilter::new(default_directive(verbosity))
        }),
        None => EnvFilter::new(default_directive(verbosity)),
    }
}

/// Install the global subscriber. Logs go to stderr; when `log_file` is set
/// they are also appended there through a non-blocking writer whose guard
/// must outlive the program's logging.
pub fn init(verbosity: u8, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(false);

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .with_context(|| format!("log file path {} has no file name", path.display()))?;
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(build_filter(verbosity))
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .context("installing tracing subscriber")?;

    Ok(guard)
}
