//! Logging setup: console output plus an optional append-only log file.
//!
//! `RUST_LOG` overrides the default level in both cases.

use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Arc;

use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

fn filter(debug: bool) -> EnvFilter {
    let default = if debug { "debug" } else { "info" };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Install the global subscriber.
///
/// With a `log_file` a second, non-ANSI layer appends to it; the parent
/// directory is created when missing.
pub fn init(debug: bool, log_file: Option<&Path>) -> std::io::Result<()> {
    let file_layer = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    fs::create_dir_all(parent)?;
                }
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(Arc::new(file))
                    .with_ansi(false)
                    .with_target(true),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(file_layer)
        .with(filter(debug))
        .init();

    Ok(())
}

/// Run `f` with console-only logging, before the global subscriber exists.
///
/// Used while loading settings, whose warnings would otherwise be lost
/// because the log file location is itself a setting.
pub fn with_console<T>(debug: bool, f: impl FnOnce() -> T) -> T {
    let subscriber = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(filter(debug));
    tracing::subscriber::with_default(subscriber, f)
}
