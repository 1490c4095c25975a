// src/exec/process.rs

//! Process handles.
//!
//! Every spawned child is owned by exactly one reaper task. The reaper waits
//! for either natural exit or a kill request, reaps the child and publishes
//! the final [`ProcessState`] once. [`ProcessHandle`] is the cloneable
//! front-end used by sessions and the registry; it never touches the child
//! directly, so there is no way to kill or reap twice.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::Arc;

use tokio::io::AsyncRead;
use tokio::process::Command;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::errors::{CmdStreamError, Result};
use crate::types::CommandSpec;

/// Exit code reported when the process was terminated by a signal.
pub const SIGNAL_EXIT_CODE: i32 = -1;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One of the two output pipes of a child.
pub type OutputStream = Pin<Box<dyn AsyncRead + Send>>;

/// The minimal surface the reaper needs from a child process.
///
/// Implemented for `tokio::process::Child`; tests provide scripted children.
pub trait ChildProcess: Send + 'static {
    fn id(&self) -> Option<u32>;

    /// Wait for exit. `Ok(None)` means the process died from a signal.
    fn wait(&mut self) -> BoxFuture<'_, io::Result<Option<i32>>>;

    /// Forcibly terminate the process and reap it.
    fn kill(&mut self) -> BoxFuture<'_, io::Result<()>>;
}

impl ChildProcess for tokio::process::Child {
    fn id(&self) -> Option<u32> {
        tokio::process::Child::id(self)
    }

    fn wait(&mut self) -> BoxFuture<'_, io::Result<Option<i32>>> {
        Box::pin(async move {
            let status = tokio::process::Child::wait(self).await?;
            Ok(status.code())
        })
    }

    fn kill(&mut self) -> BoxFuture<'_, io::Result<()>> {
        Box::pin(tokio::process::Child::kill(self))
    }
}

/// Lifecycle of a child as seen through its handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Running,
    /// Final state, published exactly once.
    Terminated { code: i32, killed: bool },
}

impl ProcessState {
    pub fn is_terminated(&self) -> bool {
        matches!(self, ProcessState::Terminated { .. })
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ProcessState::Running => None,
            ProcessState::Terminated { code, .. } => Some(*code),
        }
    }
}

/// Cloneable handle to a supervised child process.
///
/// Dropping the last handle is treated as a kill request.
#[derive(Debug, Clone)]
pub struct ProcessHandle {
    pid: Option<u32>,
    kill_tx: Arc<watch::Sender<bool>>,
    state_rx: watch::Receiver<ProcessState>,
}

impl ProcessHandle {
    /// Hand `child` to a new reaper task and return its handle.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn supervise<C: ChildProcess>(child: C) -> Self {
        let pid = child.id();
        let (kill_tx, kill_rx) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(ProcessState::Running);

        tokio::spawn(reap(child, pid, kill_rx, state_tx));

        Self {
            pid,
            kill_tx: Arc::new(kill_tx),
            state_rx,
        }
    }

    /// OS process id, if the child reported one.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn state(&self) -> ProcessState {
        *self.state_rx.borrow()
    }

    pub fn is_terminated(&self) -> bool {
        self.state().is_terminated()
    }

    /// Request termination.
    ///
    /// Idempotent: returns `true` only for the call that actually issued the
    /// request. Killing a terminated or already-killed process is a no-op.
    pub fn kill(&self) -> bool {
        if self.is_terminated() {
            return false;
        }
        self.kill_tx.send_if_modified(|requested| {
            if *requested {
                false
            } else {
                *requested = true;
                true
            }
        })
    }

    /// Wait until the process has terminated and return its exit code.
    ///
    /// Cancel safe. Any number of callers may wait concurrently.
    pub async fn wait(&self) -> i32 {
        let mut rx = self.state_rx.clone();
        match rx.wait_for(ProcessState::is_terminated).await {
            Ok(state) => state.exit_code().unwrap_or(SIGNAL_EXIT_CODE),
            // The reaper is gone without publishing; nothing left to wait on.
            Err(_) => SIGNAL_EXIT_CODE,
        }
    }
}

async fn reap<C: ChildProcess>(
    mut child: C,
    pid: Option<u32>,
    mut kill_rx: watch::Receiver<bool>,
    state_tx: watch::Sender<ProcessState>,
) {
    let state = tokio::select! {
        status = child.wait() => {
            let code = match status {
                Ok(code) => code.unwrap_or(SIGNAL_EXIT_CODE),
                Err(e) => {
                    warn!(?pid, error = %e, "failed waiting for child process");
                    SIGNAL_EXIT_CODE
                }
            };
            debug!(?pid, exit_code = code, "child process exited");
            ProcessState::Terminated { code, killed: false }
        }

        // Either an explicit kill or every handle was dropped. The borrow
        // guard must not live across the awaits below.
        _ = async { let _ = kill_rx.wait_for(|requested| *requested).await; } => {
            if let Err(e) = child.kill().await {
                warn!(?pid, error = %e, "failed to kill child process");
            }
            let code = match child.wait().await {
                Ok(code) => code.unwrap_or(SIGNAL_EXIT_CODE),
                Err(_) => SIGNAL_EXIT_CODE,
            };
            info!(?pid, exit_code = code, "child process killed");
            ProcessState::Terminated { code, killed: true }
        }
    };

    state_tx.send_replace(state);
}

/// A freshly spawned process: its handle plus both output pipes.
pub struct SpawnedProcess {
    pub handle: ProcessHandle,
    pub stdout: OutputStream,
    pub stderr: OutputStream,
}

impl std::fmt::Debug for SpawnedProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpawnedProcess")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

/// Spawn `spec` as a real OS process.
///
/// The program is executed directly (no shell). stdin is the null device;
/// stdout and stderr are piped.
pub fn spawn(spec: &CommandSpec) -> Result<SpawnedProcess> {
    let mut cmd = Command::new(spec.program());
    cmd.args(spec.args())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|source| CmdStreamError::Spawn {
        program: spec.program().to_string(),
        source,
    })?;

    let stdout = child.stdout.take().ok_or_else(|| missing_pipe(spec, "stdout"))?;
    let stderr = child.stderr.take().ok_or_else(|| missing_pipe(spec, "stderr"))?;

    info!(pid = ?child.id(), command = %spec, "spawned process");

    Ok(SpawnedProcess {
        handle: ProcessHandle::supervise(child),
        stdout: Box::pin(stdout),
        stderr: Box::pin(stderr),
    })
}

fn missing_pipe(spec: &CommandSpec, pipe: &str) -> CmdStreamError {
    CmdStreamError::Spawn {
        program: spec.program().to_string(),
        source: io::Error::other(format!("{pipe} pipe was not captured")),
    }
}

/// Trait abstracting how commands become processes.
///
/// Production code uses [`SystemBackend`]; tests can provide scripted
/// children without touching the OS.
pub trait ProcessBackend: Send + Sync {
    fn spawn(&self, spec: &CommandSpec) -> Result<SpawnedProcess>;
}

/// Spawns real OS processes via [`spawn`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemBackend;

impl ProcessBackend for SystemBackend {
    fn spawn(&self, spec: &CommandSpec) -> Result<SpawnedProcess> {
        spawn(spec)
    }
}
