// src/cli.rs

//! CLI argument parsing using `clap`.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::default_config_path;

/// Command-line arguments for `cmdstream`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "cmdstream",
    version,
    about = "Run commands on request and stream their output as server-sent events.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// A missing file means built-in defaults.
    #[arg(long, value_name = "PATH", default_value_os_t = default_config_path())]
    pub config: PathBuf,

    /// Listen address, overriding `[server].bind`.
    #[arg(long, value_name = "ADDR")]
    pub bind: Option<SocketAddr>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `CMDSTREAM_LOG`, then `[logging].level` is used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate config, print the effective settings, don't serve.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
