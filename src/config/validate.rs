// src/config/validate.rs

use std::net::SocketAddr;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{CmdStreamError, Result};
use crate::logging::parse_level_str;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = CmdStreamError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let bind_addr = parse_bind(&raw.server.bind)?;
        validate_stream(&raw)?;
        let log_level = parse_level_str(&raw.logging.level).ok_or_else(|| {
            CmdStreamError::ConfigError(format!(
                "[logging].level must be one of error, warn, info, debug, trace (got \"{}\")",
                raw.logging.level
            ))
        })?;
        Ok(ConfigFile::new_unchecked(raw, bind_addr, log_level))
    }
}

fn parse_bind(bind: &str) -> Result<SocketAddr> {
    bind.trim().parse().map_err(|e| {
        CmdStreamError::ConfigError(format!("[server].bind \"{bind}\" is not a socket address: {e}"))
    })
}

fn validate_stream(cfg: &RawConfigFile) -> Result<()> {
    let stream = &cfg.stream;

    if stream.channel_capacity == 0 {
        return Err(CmdStreamError::ConfigError(
            "[stream].channel_capacity must be >= 1 (got 0)".to_string(),
        ));
    }

    if stream.keep_alive_secs == 0 {
        return Err(CmdStreamError::ConfigError(
            "[stream].keep_alive_secs must be >= 1 (got 0)".to_string(),
        ));
    }

    if stream.max_line_bytes == 0 {
        return Err(CmdStreamError::ConfigError(
            "[stream].max_line_bytes must be >= 1 (got 0)".to_string(),
        ));
    }

    Ok(())
}
