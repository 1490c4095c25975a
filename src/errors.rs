// src/errors.rs

//! Crate-wide error type and result alias.

use thiserror::Error;

use crate::engine::fault::FaultKind;

#[derive(Error, Debug)]
pub enum CmdStreamError {
    /// The request carried no usable command text.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The program could not be located or executed.
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// A process-wide fault terminated the session.
    #[error("Runtime fault: {0}")]
    Fault(FaultKind),

    /// The client went away while the session was streaming.
    #[error("client disconnected")]
    ClientDisconnect,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, CmdStreamError>;
