//! Logging and tracing setup for Quill
//!
//! Log output is structured JSON by default; set `QUILL_LOG_FORMAT=pretty`
//! for human-readable development output. Levels come from `RUST_LOG`.
//! Logs go to stderr so command output on stdout stays machine-readable.

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Environment variable selecting the log output format
pub const LOG_FORMAT_ENV: &str = "QUILL_LOG_FORMAT";

/// Initialize the tracing/logging subsystem
///
/// `default_level` is used when `RUST_LOG` is unset.
pub fn init_tracing(default_level: &str) -> Result<()> {
    let format = std::env::var(LOG_FORMAT_ENV).unwrap_or_else(|_| "json".to_string());

    // Use JSON format for structured logging in production
    let json_layer = if format == "json" {
        Some(
            fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_writer(std::io::stderr),
        )
    } else {
        None
    };

    // Pretty format for development
    let pretty_layer = if format == "pretty" {
        Some(
            fmt::layer()
                .pretty()
                .with_target(true)
                .with_writer(std::io::stderr),
        )
    } else {
        None
    };

    // Anything else falls back to compact single-line output
    let compact_layer = if format != "json" && format != "pretty" {
        Some(
            fmt::layer()
                .compact()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
    } else {
        None
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(pretty_layer)
        .with(compact_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    info!(format = %format, "Tracing initialized");
    Ok(())
}
