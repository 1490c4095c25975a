// src/logging.rs

//! Logging setup for `cmdstream` using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the log level:
//! 1. `--log-level` CLI flag (if provided)
//! 2. `CMDSTREAM_LOG` environment variable (e.g. "info", "debug")
//! 3. `[logging].level` from the config file
//!
//! Logs always go to STDERR. With `[logging].dir` set, `combined.log`
//! (everything at the active level) and `error.log` (errors only) are
//! written into that directory as well.

use std::fs::{self, File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, registry};

use crate::cli::LogLevel;
use crate::config::LoggingSection;

/// Initialise global logging subscriber.
///
/// Safe to call once at startup.
pub fn init_logging(
    cli_level: Option<LogLevel>,
    config_level: tracing::Level,
    settings: &LoggingSection,
) -> Result<()> {
    let level = match cli_level {
        Some(lvl) => level_from_log_level(lvl),
        None => std::env::var("CMDSTREAM_LOG")
            .ok()
            .and_then(|s| parse_level_str(&s))
            .unwrap_or(config_level),
    };
    let level = LevelFilter::from_level(level);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .with_filter(level);

    let (combined_layer, error_layer) = match settings.dir.as_deref() {
        Some(dir) => {
            let (combined, errors) = open_log_files(dir)?;
            let combined = fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(combined))
                .with_filter(level);
            let errors = fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(errors))
                .with_filter(LevelFilter::ERROR);
            (Some(combined), Some(errors))
        }
        None => (None, None),
    };

    registry()
        .with(stderr_layer)
        .with(combined_layer)
        .with(error_layer)
        .try_init()
        .context("installing tracing subscriber")?;

    Ok(())
}

fn open_log_files(dir: &Path) -> Result<(File, File)> {
    fs::create_dir_all(dir)
        .with_context(|| format!("creating log directory {}", dir.display()))?;

    let open = |name: &str| {
        let path = dir.join(name);
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("opening log file {}", path.display()))
    };

    Ok((open("combined.log")?, open("error.log")?))
}

fn level_from_log_level(lvl: LogLevel) -> tracing::Level {
    match lvl {
        LogLevel::Error => tracing::Level::ERROR,
        LogLevel::Warn => tracing::Level::WARN,
        LogLevel::Info => tracing::Level::INFO,
        LogLevel::Debug => tracing::Level::DEBUG,
        LogLevel::Trace => tracing::Level::TRACE,
    }
}

pub fn parse_level_str(s: &str) -> Option<tracing::Level> {
    match s.trim().to_lowercase().as_str() {
        "error" => Some(tracing::Level::ERROR),
        "warn" | "warning" => Some(tracing::Level::WARN),
        "info" => Some(tracing::Level::INFO),
        "debug" => Some(tracing::Level::DEBUG),
        "trace" => Some(tracing::Level::TRACE),
        _ => None,
    }
}
