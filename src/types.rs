// src/types.rs

//! Plain data types shared by the execution layer, the session engine and
//! the HTTP transport.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::engine::fault::FaultKind;
use crate::errors::{CmdStreamError, Result};

/// A program plus its flat argument list.
///
/// Built from the raw request text by splitting on whitespace. There is no
/// quoting, piping or expansion: `echo "a b"` runs `echo` with the two
/// arguments `"a` and `b"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    program: String,
    args: Vec<String>,
}

impl CommandSpec {
    /// Parse raw command text. Blank input is a validation error.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut parts = raw.split_whitespace().map(str::to_string);
        let program = parts.next().ok_or_else(|| {
            CmdStreamError::Validation("'command' query parameter is required".to_string())
        })?;

        Ok(Self {
            program,
            args: parts.collect(),
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque per-request key into the process registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl RequestId {
    /// Allocate the next identifier. Unique for the lifetime of the process.
    pub fn next() -> Self {
        Self(NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// Which pipe a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputSource {
    Stdout,
    Stderr,
}

impl OutputSource {
    pub fn as_str(self) -> &'static str {
        match self {
            OutputSource::Stdout => "stdout",
            OutputSource::Stderr => "stderr",
        }
    }
}

impl fmt::Display for OutputSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a session ended with an `error:<kind>` marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorTag {
    /// The program could not be started.
    Spawn,
    /// A process-wide fault was broadcast.
    Fault(FaultKind),
}

impl ErrorTag {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorTag::Spawn => "spawn",
            ErrorTag::Fault(kind) => kind.as_str(),
        }
    }
}

/// One event sent to the client.
///
/// Lines keep their source tag for logging and tests; on the wire only the
/// text is sent. Terminal markers render as `exit:<code>` / `error:<kind>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundEvent {
    Line { source: OutputSource, text: String },
    Exit(i32),
    Error(ErrorTag),
}

impl OutboundEvent {
    pub fn stdout(text: impl Into<String>) -> Self {
        OutboundEvent::Line {
            source: OutputSource::Stdout,
            text: text.into(),
        }
    }

    pub fn stderr(text: impl Into<String>) -> Self {
        OutboundEvent::Line {
            source: OutputSource::Stderr,
            text: text.into(),
        }
    }

    /// True for `exit:` and `error:` markers.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OutboundEvent::Line { .. })
    }

    /// Payload of the event frame.
    pub fn payload(&self) -> String {
        match self {
            OutboundEvent::Line { text, .. } => text.clone(),
            OutboundEvent::Exit(code) => format!("exit:{code}"),
            OutboundEvent::Error(tag) => format!("error:{}", tag.as_str()),
        }
    }
}

impl fmt::Display for OutboundEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutboundEvent::Line { source, text } => write!(f, "[{source}] {text}"),
            other => f.write_str(&other.payload()),
        }
    }
}
