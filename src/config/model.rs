// src/config/model.rs

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::engine::SessionOptions;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [server]
/// bind = "127.0.0.1:3001"
/// cors = true
///
/// [stream]
/// channel_capacity = 64
/// keep_alive_secs = 15
///
/// [logging]
/// level = "info"
/// dir = "logs"
/// ```
///
/// All sections are optional and have reasonable defaults. This is the
/// unvalidated form; see [`ConfigFile`].
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub stream: StreamSection,

    #[serde(default)]
    pub logging: LoggingSection,
}

/// `[server]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    /// Listen address, `host:port`.
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Allow cross-origin requests from any origin (browser UIs served
    /// elsewhere).
    #[serde(default = "default_cors")]
    pub cors: bool,
}

fn default_bind() -> String {
    "127.0.0.1:3001".to_string()
}

fn default_cors() -> bool {
    true
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            cors: default_cors(),
        }
    }
}

/// `[stream]` section: per-session tuning.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamSection {
    /// Bounded queue between a session and its HTTP response.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Interval of SSE keep-alive comments.
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,

    /// Output drain window after the process exited.
    #[serde(default = "default_exit_drain_grace_ms")]
    pub exit_drain_grace_ms: u64,

    /// Longest line forwarded as a single event.
    #[serde(default = "default_max_line_bytes")]
    pub max_line_bytes: usize,
}

fn default_channel_capacity() -> usize {
    64
}

fn default_keep_alive_secs() -> u64 {
    15
}

fn default_exit_drain_grace_ms() -> u64 {
    2000
}

fn default_max_line_bytes() -> usize {
    crate::exec::framer::DEFAULT_MAX_LINE_BYTES
}

impl Default for StreamSection {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            keep_alive_secs: default_keep_alive_secs(),
            exit_drain_grace_ms: default_exit_drain_grace_ms(),
            max_line_bytes: default_max_line_bytes(),
        }
    }
}

impl StreamSection {
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            max_line_bytes: self.max_line_bytes,
            exit_drain_grace: Duration::from_millis(self.exit_drain_grace_ms),
        }
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSection {
    /// `error`, `warn`, `info`, `debug` or `trace`.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// If set, `combined.log` and `error.log` are written here too.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: None,
        }
    }
}

/// Validated configuration.
///
/// Only obtainable through `TryFrom<RawConfigFile>` (or [`ConfigFile::default`]),
/// so the bind address is known to parse and all capacities are non-zero.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub server: ServerSection,
    pub stream: StreamSection,
    pub logging: LoggingSection,
    bind_addr: SocketAddr,
    log_level: tracing::Level,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        raw: RawConfigFile,
        bind_addr: SocketAddr,
        log_level: tracing::Level,
    ) -> Self {
        Self {
            server: raw.server,
            stream: raw.stream,
            logging: raw.logging,
            bind_addr,
            log_level,
        }
    }

    pub fn bind_addr(&self) -> SocketAddr {
        self.bind_addr
    }

    /// Override the listen address (e.g. from `--bind`).
    pub fn set_bind_addr(&mut self, addr: SocketAddr) {
        self.bind_addr = addr;
        self.server.bind = addr.to_string();
    }

    pub fn log_level(&self) -> tracing::Level {
        self.log_level
    }
}

impl Default for ConfigFile {
    fn default() -> Self {
        let raw = RawConfigFile::default();
        let bind_addr = SocketAddr::from(([127, 0, 0, 1], 3001));
        Self::new_unchecked(raw, bind_addr, tracing::Level::INFO)
    }
}
