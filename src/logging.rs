//! Tracing setup for the binary.

use color_eyre::{eyre::eyre, Result};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

const LOG_FILE: &str = "schedule-sync.log";

/// Default log directory: `$XDG_DATA_HOME/schedule-sync`.
pub fn default_log_dir() -> Result<PathBuf> {
  dirs::data_dir()
    .map(|d| d.join("schedule-sync"))
    .ok_or_else(|| eyre!("Could not determine data directory"))
}

/// Install the global subscriber.
///
/// The filter comes from `RUST_LOG` (default `info`). Warnings and errors go
/// to stderr; everything that passes the filter is appended to a log file in
/// `log_dir`. Keep the returned guard alive until exit so buffered lines are
/// flushed.
pub fn init(log_dir: &Path, verbose: bool) -> Result<WorkerGuard> {
  std::fs::create_dir_all(log_dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", log_dir.display(), e))?;

  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

  let file_appender = tracing_appender::rolling::never(log_dir, LOG_FILE);
  let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

  let stderr_level = if verbose {
    tracing::Level::DEBUG
  } else {
    tracing::Level::WARN
  };

  tracing_subscriber::registry()
    .with(filter)
    .with(
      fmt::layer()
        .with_writer(std::io::stderr.with_max_level(stderr_level))
        .with_target(false)
        .without_time(),
    )
    .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
    .try_init()
    .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;

  Ok(guard)
}
