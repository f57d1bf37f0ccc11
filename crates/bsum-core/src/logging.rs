//! Diagnostics for bsum runs.
//!
//! Logs go to `$XDG_STATE_HOME/bsum/bsum.log` so the checksum lines on stdout
//! and the usage text stay clean; when the state dir is unusable the CLI
//! falls back to stderr. `BSUM_LOG` selects the filter and wins over
//! `RUST_LOG`.

use anyhow::{Context, Result};
use std::fs::{self, File};
use std::path::PathBuf;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,bsum=debug,bsum_core=debug";

/// Env var for the bsum log filter.
pub const FILTER_ENV: &str = "BSUM_LOG";

/// Where diagnostics ended up after initialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    File(PathBuf),
    Stderr,
}

/// Pick the filter directives: `BSUM_LOG`, then `RUST_LOG`, then the default.
/// Blank values are treated as unset.
pub fn filter_directives(bsum_log: Option<&str>, rust_log: Option<&str>) -> String {
    [bsum_log, rust_log]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty())
        .unwrap_or(DEFAULT_FILTER)
        .to_string()
}

fn env_filter() -> EnvFilter {
    let bsum_log = std::env::var(FILTER_ENV).ok();
    let rust_log = std::env::var("RUST_LOG").ok();
    let directives = filter_directives(bsum_log.as_deref(), rust_log.as_deref());
    EnvFilter::try_new(&directives).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Path of the log file: `$XDG_STATE_HOME/bsum/bsum.log` (parent dir is created).
pub fn log_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("bsum")?;
    Ok(xdg_dirs.place_state_file("bsum.log")?)
}

/// Every event is appended through a shared handle to the log file.
struct AppendLog(File);

impl<'a> MakeWriter<'a> for AppendLog {
    type Writer = &'a File;

    fn make_writer(&'a self) -> Self::Writer {
        &self.0
    }
}

/// Install the file subscriber. Errors when the log file cannot be opened so
/// the caller can fall back to [`init_logging_stderr`].
pub fn init_logging() -> Result<LogTarget> {
    let path = log_path()?;
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    }
    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("open log {}", path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(AppendLog(file))
        .with_ansi(false)
        .with_thread_names(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("install log subscriber: {}", e))?;

    log_session_start(&LogTarget::File(path.clone()));
    Ok(LogTarget::File(path))
}

/// Stderr-only logging, for when [`init_logging`] fails.
pub fn init_logging_stderr() -> LogTarget {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_thread_names(true)
        .try_init();
    log_session_start(&LogTarget::Stderr);
    LogTarget::Stderr
}

fn log_session_start(target: &LogTarget) {
    let target = match target {
        LogTarget::File(path) => path.display().to_string(),
        LogTarget::Stderr => "stderr".to_string(),
    };
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = std::process::id(),
        %target,
        "bsum session started"
    );
}
