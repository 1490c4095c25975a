// src/engine/session.rs

//! Async IO shell around [`SessionCore`].
//!
//! A `Session` owns one request end to end: spawn, register, stream both
//! pipes, and run the cleanup commands of whichever trigger wins the race
//! (process exit, client disconnect, fault broadcast).

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

use crate::engine::SessionOptions;
use crate::engine::core::{SessionCommand, SessionCore, SessionOutcome, Trigger};
use crate::engine::fault::{FaultMonitor, FaultSubscription};
use crate::engine::registry::ProcessRegistry;
use crate::errors::Result;
use crate::exec::process::SIGNAL_EXIT_CODE;
use crate::exec::{FramedReader, OutputStream, ProcessBackend, ProcessHandle, SpawnedProcess};
use crate::types::{CommandSpec, OutboundEvent, RequestId};

/// How long a terminal event may wait for room in a stalled client's queue.
/// Cleanup has already run by then; this only bounds the session task.
const LATE_TERMINAL_EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything sessions share with each other.
#[derive(Clone)]
pub struct SessionContext {
    pub registry: Arc<ProcessRegistry>,
    pub faults: FaultMonitor,
    pub backend: Arc<dyn ProcessBackend>,
    pub options: SessionOptions,
}

impl fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContext")
            .field("registry", &self.registry)
            .field("faults", &self.faults)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl SessionContext {
    pub fn new(backend: Arc<dyn ProcessBackend>, options: SessionOptions) -> Self {
        Self {
            registry: ProcessRegistry::shared(),
            faults: FaultMonitor::new(),
            backend,
            options,
        }
    }
}

/// One client request's process lifecycle.
pub struct Session {
    id: RequestId,
    spec: CommandSpec,
    ctx: SessionContext,
    events: mpsc::Sender<OutboundEvent>,
    core: SessionCore,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("spec", &self.spec)
            .field("core", &self.core)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Validate `raw` and prepare a session that reports to `events`.
    ///
    /// Blank command text fails here, before any process exists.
    pub fn open(
        raw: &str,
        ctx: &SessionContext,
        events: mpsc::Sender<OutboundEvent>,
    ) -> Result<Self> {
        let spec = CommandSpec::parse(raw)?;
        Ok(Self {
            id: RequestId::next(),
            spec,
            ctx: ctx.clone(),
            events,
            core: SessionCore::new(),
        })
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn spec(&self) -> &CommandSpec {
        &self.spec
    }

    /// Drive the session to `Closed`.
    ///
    /// Dropping `events`' receiver is the client-disconnect signal.
    pub async fn run(mut self) -> Result<SessionOutcome> {
        let SpawnedProcess {
            handle,
            stdout,
            stderr,
        } = match self.ctx.backend.spawn(&self.spec) {
            Ok(spawned) => spawned,
            Err(e) => {
                warn!(request_id = %self.id, command = %self.spec, error = %e, "spawn failed");
                let commands = self.core.spawn_failed().map_err(anyhow::Error::from)?;
                let late = self.execute_all(commands, None);
                self.deliver_late(late).await;
                return Ok(SessionOutcome::SpawnFailed);
            }
        };

        self.ctx.registry.register(self.id, handle.clone());
        let _registration = RegistrationGuard {
            registry: Arc::clone(&self.ctx.registry),
            id: self.id,
            handle: handle.clone(),
        };
        let mut faults = self.ctx.faults.subscribe();
        self.core.spawned().map_err(anyhow::Error::from)?;

        info!(
            request_id = %self.id,
            pid = ?handle.pid(),
            command = %self.spec,
            "session streaming"
        );

        let trigger = self.stream(&handle, stdout, stderr, &mut faults).await;
        info!(request_id = %self.id, ?trigger, "session terminating");

        let commands = self.core.trigger(trigger).unwrap_or_default();
        let late = self.execute_all(commands, Some(&handle));
        self.core.close().map_err(anyhow::Error::from)?;
        drop(faults);

        // The process is already released; a stalled client only delays
        // its terminal event.
        self.deliver_late(late).await;

        let outcome = self.core.outcome().unwrap_or(SessionOutcome::from(trigger));
        debug!(request_id = %self.id, ?outcome, "session closed");
        Ok(outcome)
    }

    /// Forward output until one of the termination triggers fires.
    async fn stream(
        &self,
        handle: &ProcessHandle,
        stdout: OutputStream,
        stderr: OutputStream,
        faults: &mut FaultSubscription,
    ) -> Trigger {
        let max_line = self.ctx.options.max_line_bytes;
        let mut stdout = FramedReader::with_max_line_bytes(stdout, max_line);
        let mut stderr = FramedReader::with_max_line_bytes(stderr, max_line);
        let mut stdout_open = true;
        let mut stderr_open = true;
        let mut exit_code: Option<i32> = None;
        let mut drain_deadline: Option<Instant> = None;

        loop {
            if let Some(code) = exit_code {
                if !stdout_open && !stderr_open {
                    return Trigger::ProcessExited(code);
                }
            }

            tokio::select! {
                line = stdout.next_line(), if stdout_open => match line {
                    Ok(Some(text)) => {
                        if let Some(trigger) = self.forward(OutboundEvent::stdout(text), faults).await {
                            return trigger;
                        }
                    }
                    Ok(None) => stdout_open = false,
                    Err(e) => {
                        warn!(request_id = %self.id, error = %e, "stdout read failed");
                        stdout_open = false;
                    }
                },

                line = stderr.next_line(), if stderr_open => match line {
                    Ok(Some(text)) => {
                        if let Some(trigger) = self.forward(OutboundEvent::stderr(text), faults).await {
                            return trigger;
                        }
                    }
                    Ok(None) => stderr_open = false,
                    Err(e) => {
                        warn!(request_id = %self.id, error = %e, "stderr read failed");
                        stderr_open = false;
                    }
                },

                code = handle.wait(), if exit_code.is_none() => {
                    debug!(request_id = %self.id, exit_code = code, "process exited; draining output");
                    exit_code = Some(code);
                    drain_deadline = Some(Instant::now() + self.ctx.options.exit_drain_grace);
                }

                _ = sleep_until(drain_deadline.unwrap_or_else(Instant::now)), if drain_deadline.is_some() => {
                    warn!(
                        request_id = %self.id,
                        "output pipes still open after process exit; closing stream"
                    );
                    return Trigger::ProcessExited(exit_code.unwrap_or(SIGNAL_EXIT_CODE));
                }

                _ = self.events.closed() => return Trigger::ClientDisconnected,

                fault = faults.recv() => {
                    warn!(request_id = %self.id, kind = %fault.kind, "fault received");
                    return Trigger::Fault(fault.kind);
                }
            }
        }
    }

    /// Queue one line for the client.
    ///
    /// Waiting for queue space still reacts to faults and to the client
    /// going away; either ends streaming with the returned trigger.
    async fn forward(
        &self,
        event: OutboundEvent,
        faults: &mut FaultSubscription,
    ) -> Option<Trigger> {
        debug!(request_id = %self.id, %event, "process output");
        tokio::select! {
            permit = self.events.reserve() => match permit {
                Ok(permit) => {
                    permit.send(event);
                    None
                }
                Err(_) => Some(Trigger::ClientDisconnected),
            },
            fault = faults.recv() => {
                warn!(request_id = %self.id, kind = %fault.kind, "fault received while client is stalled");
                Some(Trigger::Fault(fault.kind))
            }
        }
    }

    /// Run cleanup commands without waiting on the client.
    ///
    /// Returns the terminal event if the client's queue was full.
    fn execute_all(
        &self,
        commands: Vec<SessionCommand>,
        handle: Option<&ProcessHandle>,
    ) -> Option<OutboundEvent> {
        let mut late = None;
        for command in commands {
            if let Some(event) = self.execute(command, handle) {
                late = Some(event);
            }
        }
        late
    }

    fn execute(
        &self,
        command: SessionCommand,
        handle: Option<&ProcessHandle>,
    ) -> Option<OutboundEvent> {
        match command {
            SessionCommand::Emit(event) => {
                debug!(request_id = %self.id, %event, "emitting terminal event");
                match self.events.try_send(event) {
                    Ok(()) => None,
                    Err(TrySendError::Full(event)) => Some(event),
                    Err(TrySendError::Closed(_)) => {
                        debug!(request_id = %self.id, "client gone before terminal event");
                        None
                    }
                }
            }
            SessionCommand::Kill => {
                if let Some(handle) = handle {
                    if handle.kill() {
                        info!(request_id = %self.id, pid = ?handle.pid(), "killing process");
                    }
                }
                None
            }
            SessionCommand::Unregister => {
                self.ctx.registry.unregister(self.id);
                None
            }
        }
    }

    async fn deliver_late(&self, event: Option<OutboundEvent>) {
        let Some(event) = event else {
            return;
        };
        match tokio::time::timeout(LATE_TERMINAL_EVENT_TIMEOUT, self.events.send(event)).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => debug!(request_id = %self.id, "client gone before terminal event"),
            Err(_) => warn!(request_id = %self.id, "client stalled; terminal event dropped"),
        }
    }
}

/// Releases the process if a session is dropped before it finished its own
/// cleanup (task aborted or panicked). Both steps are idempotent, so after a
/// normal close this does nothing.
struct RegistrationGuard {
    registry: Arc<ProcessRegistry>,
    id: RequestId,
    handle: ProcessHandle,
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        if self.registry.unregister(self.id).is_some() {
            warn!(request_id = %self.id, "session dropped before cleanup; releasing process");
        }
        self.handle.kill();
    }
}
