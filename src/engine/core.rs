// src/engine/core.rs

//! Pure session state machine.
//!
//! `SessionCore` decides *what* a session does; the async shell in
//! [`super::session`] decides *how*. It consumes transitions and termination
//! triggers and returns the [`SessionCommand`]s the shell must execute. It
//! has no channels, no Tokio types and performs no IO, so it can be tested
//! exhaustively on its own.
//!
//! The core is also the single-fire gate for cleanup: only the first
//! trigger accepted in `Streaming` produces commands.

use std::fmt;

use crate::engine::fault::FaultKind;
use crate::errors::CmdStreamError;
use crate::types::{ErrorTag, OutboundEvent};

/// Lifecycle phase of one streaming request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Spawning,
    Streaming,
    Terminating,
    Closed,
}

/// The three independent reasons a streaming session ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// The process exited on its own and its output was drained.
    ProcessExited(i32),
    /// The transport reported that the client went away.
    ClientDisconnected,
    /// The fault monitor broadcast a process-wide fault.
    Fault(FaultKind),
}

/// Side effects requested by the core, executed in order by the shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    Emit(OutboundEvent),
    Kill,
    Unregister,
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    Exited(i32),
    Disconnected,
    Faulted(FaultKind),
    SpawnFailed,
}

impl SessionOutcome {
    /// The abnormal end as an error. `None` when the process ran to
    /// completion or never started.
    pub fn as_error(self) -> Option<CmdStreamError> {
        match self {
            SessionOutcome::Disconnected => Some(CmdStreamError::ClientDisconnect),
            SessionOutcome::Faulted(kind) => Some(CmdStreamError::Fault(kind)),
            SessionOutcome::Exited(_) | SessionOutcome::SpawnFailed => None,
        }
    }
}

impl From<Trigger> for SessionOutcome {
    fn from(trigger: Trigger) -> Self {
        match trigger {
            Trigger::ProcessExited(code) => SessionOutcome::Exited(code),
            Trigger::ClientDisconnected => SessionOutcome::Disconnected,
            Trigger::Fault(kind) => SessionOutcome::Faulted(kind),
        }
    }
}

/// Rejected transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidTransition {
    pub from: SessionState,
    pub to: SessionState,
}

impl fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid session transition {:?} -> {:?}", self.from, self.to)
    }
}

impl std::error::Error for InvalidTransition {}

#[derive(Debug)]
pub struct SessionCore {
    state: SessionState,
    outcome: Option<SessionOutcome>,
}

impl Default for SessionCore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionCore {
    pub fn new() -> Self {
        Self {
            state: SessionState::Spawning,
            outcome: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The outcome once a trigger or spawn failure has been accepted.
    pub fn outcome(&self) -> Option<SessionOutcome> {
        self.outcome
    }

    /// `Spawning -> Streaming`, after the process was spawned and registered.
    pub fn spawned(&mut self) -> Result<(), InvalidTransition> {
        self.transition(SessionState::Spawning, SessionState::Streaming)
    }

    /// `Spawning -> Closed`: the single error event for a failed spawn.
    pub fn spawn_failed(&mut self) -> Result<Vec<SessionCommand>, InvalidTransition> {
        self.transition(SessionState::Spawning, SessionState::Closed)?;
        self.outcome = Some(SessionOutcome::SpawnFailed);
        Ok(vec![SessionCommand::Emit(OutboundEvent::Error(ErrorTag::Spawn))])
    }

    /// Offer a termination trigger.
    ///
    /// Returns the cleanup commands for the first trigger seen while
    /// `Streaming`, and `None` for everything else.
    pub fn trigger(&mut self, trigger: Trigger) -> Option<Vec<SessionCommand>> {
        if self.state != SessionState::Streaming {
            return None;
        }
        self.state = SessionState::Terminating;
        self.outcome = Some(trigger.into());

        let commands = match trigger {
            Trigger::ProcessExited(code) => vec![
                SessionCommand::Emit(OutboundEvent::Exit(code)),
                SessionCommand::Unregister,
            ],
            // The transport is gone; nothing more is sent.
            Trigger::ClientDisconnected => {
                vec![SessionCommand::Kill, SessionCommand::Unregister]
            }
            Trigger::Fault(kind) => vec![
                SessionCommand::Emit(OutboundEvent::Error(ErrorTag::Fault(kind))),
                SessionCommand::Kill,
                SessionCommand::Unregister,
            ],
        };
        Some(commands)
    }

    /// `Terminating -> Closed`, after the cleanup commands ran.
    pub fn close(&mut self) -> Result<(), InvalidTransition> {
        self.transition(SessionState::Terminating, SessionState::Closed)
    }

    fn transition(&mut self, from: SessionState, to: SessionState) -> Result<(), InvalidTransition> {
        if self.state != from {
            return Err(InvalidTransition {
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }
}
