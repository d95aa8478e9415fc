// src/logging.rs

//! Logging setup for `taskgraph` using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the log level:
//! 1. `TASKGRAPH_LOG` environment variable (e.g. "info", "debug")
//! 2. default to `info`
//!
//! Worker and timer-dispatch threads are named (`taskgraph-worker-N`,
//! `taskgraph-timer-N`) so thread ids/names are worth keeping in the log
//! output, unlike a single-threaded CLI tool.

use anyhow::Result;
use tracing_subscriber::fmt;

/// Initialise the global logging subscriber.
///
/// Safe to call once at startup; a second call will return an error from
/// `tracing`'s global dispatcher, which callers may ignore in tests.
pub fn init_logging() -> Result<()> {
    let level = std::env::var("TASKGRAPH_LOG")
        .ok()
        .and_then(|s| parse_level_str(&s))
        .unwrap_or(tracing::Level::INFO);

    fmt()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}

fn parse_level_str(s: &str) -> Option<tracing::Level> {
    match s.trim().to_lowercase().as_str() {
        "error" => Some(tracing::Level::ERROR),
        "warn" | "warning" => Some(tracing::Level::WARN),
        "info" => Some(tracing::Level::INFO),
        "debug" => Some(tracing::Level::DEBUG),
        "trace" => Some(tracing::Level::TRACE),
        _ => None,
    }
}
