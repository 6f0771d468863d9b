//! # Logging Setup
//!
//! Installs the global `tracing` subscriber used by the `fx_watch` binaries:
//! an ANSI console layer plus a JSON file layer written through a daily
//! rolling, non-blocking appender. The filter comes from `RUST_LOG` when set,
//! otherwise from the configured level.

use std::io;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Builds the filter: `RUST_LOG` if it parses, else `fallback_level`, else
/// `info`.
pub fn env_filter(fallback_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback_level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initializes console and rolling JSON file logging.
///
/// Log files are named `<app_name>.<date>` inside `log_dir`, which is created
/// if missing. The returned guard flushes the file writer when dropped and
/// must be kept alive for as long as logging is needed.
pub fn init_tracing(log_dir: &Path, level: &str, app_name: &str) -> io::Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)?;

    let file_appender = rolling::daily(log_dir, app_name);
    let (non_blocking_appender, guard) = non_blocking(file_appender);

    let console_layer = fmt::layer().with_target(true).with_ansi(true);
    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_writer(non_blocking_appender)
        .json();

    tracing_subscriber::registry()
        .with(env_filter(level))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| io::Error::new(io::ErrorKind::AlreadyExists, e.to_string()))?;

    Ok(guard)
}
