//! Logging initialization
//!
//! Installs the global `tracing` subscriber according to `LogConfig`: text
//! or JSON output on stdout, optionally teed into an append-only file
//! written by a background worker.

use crate::config::LogConfig;
use anyhow::Result;
use once_cell::sync::OnceCell;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Keeps the file writer's background worker alive for the process lifetime
static FILE_GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();

/// Compute the effective filter spec
///
/// Precedence: `RUST_LOG` > CLI verbosity > `log.level`.
///
/// - verbosity 0: `warn,dnsfence=<level>`
/// - verbosity 1: `warn,dnsfence=debug`
/// - verbosity 2: `warn,dnsfence=trace`
/// - verbosity 3 and up: `trace` for every crate
pub(crate) fn effective_log_spec(cfg: &LogConfig, verbosity: u8) -> String {
    match std::env::var("RUST_LOG") {
        Ok(v) if !v.is_empty() => return v,
        _ => {}
    }

    match verbosity {
        0 => format!("warn,dnsfence={}", cfg.level),
        1 => "warn,dnsfence=debug".to_string(),
        2 => "warn,dnsfence=trace".to_string(),
        _ => "trace".to_string(),
    }
}

/// Initialize global logging
///
/// Calling it again after a subscriber is installed is a no-op.
///
/// # Errors
///
/// Fails when the filter spec is invalid or the log file cannot be opened.
pub fn init_logging(cfg: &LogConfig, verbosity: u8) -> Result<()> {
    let filter = EnvFilter::try_new(effective_log_spec(cfg, verbosity))?;
    let registry = tracing_subscriber::registry().with(filter);

    let writer = match &cfg.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            let (non_blocking, guard) = tracing_appender::non_blocking(file);
            let _ = FILE_GUARD.set(guard);
            BoxMakeWriter::new(std::io::stdout.and(non_blocking))
        }
        None => BoxMakeWriter::new(std::io::stdout),
    };
    // No color codes in files
    let ansi = cfg.file.is_none();

    if cfg.format == "json" {
        let layer = tracing_subscriber::fmt::layer()
            .json()
            .with_ansi(false)
            .with_writer(writer);
        let _ = registry.with(layer).try_init();
    } else {
        let layer = tracing_subscriber::fmt::layer()
            .with_ansi(ansi)
            .with_writer(writer);
        let _ = registry.with(layer).try_init();
    }

    Ok(())
}
