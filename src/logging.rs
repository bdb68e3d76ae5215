//! Logging setup.
//!
//! Two layers share one `EnvFilter` (`RUST_LOG`, default `info`):
//! - a daily-rolling file under [`crate::app_dirs::logs_dir`], written through
//!   a non-blocking appender
//! - stderr, because stdout carries the host JSON protocol
//!
//! Worker stderr is logged under the `dryeye::worker` target, so
//! `RUST_LOG=info,dryeye::worker=debug` surfaces it.

use std::io;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// File name prefix of the rolling log.
pub const LOG_FILE_PREFIX: &str = "dryeye.log";

/// Keeps the file writer alive. Dropping it flushes pending lines.
pub struct LoggingGuard {
    _file_guard: WorkerGuard,
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber writing to `log_dir` and stderr.
///
/// # Errors
///
/// Returns an error if `log_dir` cannot be created.
pub fn init_logging(log_dir: &Path) -> Result<LoggingGuard, io::Error> {
    std::fs::create_dir_all(log_dir)?;

    let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false);
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_target(false);

    tracing_subscriber::registry()
        .with(env_filter())
        .with(file_layer)
        .with(stderr_layer)
        .init();

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

/// Stderr-only fallback when the log directory is unusable.
pub fn init_stderr_logging() {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(env_filter())
        .init();
}
