//! Shared logging setup for Modflow binaries.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub const DEFAULT_LOG_FILTER: &str = "modflow=info,modflow_orchestrator=info";
const VERBOSE_LOG_FILTER: &str = "modflow=debug,modflow_orchestrator=debug";

/// Logging configuration shared by Modflow binaries.
pub struct LogConfig<'a> {
    pub app_name: &'a str,
    /// Directory for the daily rolling log file; `None` disables file logging
    pub log_dir: Option<PathBuf>,
    pub verbose: bool,
}

/// Initialize tracing with a daily rolling file writer and stderr output.
/// stdout is left to command output.
///
/// The returned guard flushes the file writer on drop; keep it alive for
/// the life of the process.
pub fn init_logging(config: LogConfig<'_>) -> Result<Option<WorkerGuard>> {
    let file_filter = default_filter(config.verbose);

    let mut guard = None;
    let file_layer = match config.log_dir.as_deref() {
        Some(dir) => {
            ensure_dir(dir).context("Failed to ensure log directory")?;
            let file_appender =
                tracing_appender::rolling::daily(dir, log_file_name(config.app_name));
            let (file_writer, worker_guard) = tracing_appender::non_blocking(file_appender);
            guard = Some(worker_guard);
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(file_writer)
                    .with_ansi(false)
                    .with_filter(file_filter),
            )
        }
        None => None,
    };

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(config.verbose)
        .with_filter(console_filter(config.verbose));

    tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}

/// `RUST_LOG` when set, otherwise the Modflow defaults
fn default_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new(VERBOSE_LOG_FILTER)
        } else {
            EnvFilter::new(DEFAULT_LOG_FILTER)
        }
    })
}

fn console_filter(verbose: bool) -> EnvFilter {
    if verbose {
        default_filter(true)
    } else {
        EnvFilter::new("warn")
    }
}

fn ensure_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create logs directory: {}", dir.display()))
}

fn log_file_name(app_name: &str) -> String {
    format!("{}.log", sanitize_name(app_name))
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' { ch } else { '_' })
        .collect()
}
