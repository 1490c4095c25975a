// src/engine/mod.rs

//! Per-request process lifecycle engine.
//!
//! This module ties together:
//! - the process registry shared by all sessions ([`registry`])
//! - the fault monitor that can end every session at once ([`fault`])
//! - the pure session state machine ([`core`])
//! - the async session shell that races output, exit, disconnect and
//!   faults ([`session`])

use std::time::Duration;

use crate::exec::framer::DEFAULT_MAX_LINE_BYTES;

/// Default time to keep draining output after the process has exited.
pub const DEFAULT_EXIT_DRAIN_GRACE: Duration = Duration::from_millis(2000);

/// Per-session tuning shared by every session of a server.
#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    /// Longest line forwarded as a single event.
    pub max_line_bytes: usize,
    /// How long output may stay open after the process exited before the
    /// exit marker is sent anyway.
    pub exit_drain_grace: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
            exit_drain_grace: DEFAULT_EXIT_DRAIN_GRACE,
        }
    }
}

pub mod core;
pub mod fault;
pub mod registry;
pub mod session;

pub use self::core::{SessionCommand, SessionCore, SessionOutcome, SessionState, Trigger};
pub use fault::{Fault, FaultKind, FaultMonitor, FaultSubscription};
pub use registry::ProcessRegistry;
pub use session::{Session, SessionContext};
