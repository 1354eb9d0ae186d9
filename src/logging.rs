//! Tracing configuration and log routing.
//!
//! Logs go to stdout through a compact formatter, filtered by `RUST_LOG`
//! (default `info`). A file layer is added when possible: `DOCPIPE_LOG_FILE`
//! names an explicit target, otherwise `logs/docpipe.log` is used. File
//! output goes through a non-blocking writer so operator hot paths never
//! wait on disk I/O.
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Install the stdout subscriber and, when a writer is available, the file layer.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(false).compact());

    match file_writer() {
        Some(writer) => {
            registry
                .with(
                    fmt::layer()
                        .with_writer(writer)
                        .with_target(true)
                        .with_ansi(false)
                        .compact(),
                )
                .init();
        }
        None => registry.init(),
    }
}

/// Open the log file and wrap it in a non-blocking writer.
///
/// The worker guard is parked in a global so the writer stays alive for the
/// process lifetime. Returns `None` when neither the configured path nor
/// the default logs directory is usable; the server then runs stdout-only.
fn file_writer() -> Option<NonBlocking> {
    let (non_blocking, guard) = match std::env::var("DOCPIPE_LOG_FILE") {
        Ok(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(|err| eprintln!("Failed to open log file {path}: {err}"))
                .ok()?;
            tracing_appender::non_blocking(file)
        }
        Err(_) => {
            if let Err(err) = std::fs::create_dir_all("logs") {
                eprintln!("Failed to create logs directory: {err}");
                return None;
            }
            tracing_appender::non_blocking(tracing_appender::rolling::never("logs", "docpipe.log"))
        }
    };
    let _ = LOG_GUARD.set(guard);
    Some(non_blocking)
}
