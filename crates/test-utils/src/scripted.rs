use std::collections::HashSet;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use cmdstream::errors::{CmdStreamError, Result};
use cmdstream::exec::process::BoxFuture;
use cmdstream::exec::{ChildProcess, ProcessBackend, ProcessHandle, SpawnedProcess};
use cmdstream::types::CommandSpec;
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::sync::{mpsc, oneshot};

static NEXT_FAKE_PID: AtomicU32 = AtomicU32::new(40_000);

/// A child whose exit is decided by the test.
pub struct ScriptedChild {
    pid: u32,
    exit_rx: Option<oneshot::Receiver<i32>>,
    killed: bool,
    kills: Arc<AtomicUsize>,
}

impl ChildProcess for ScriptedChild {
    fn id(&self) -> Option<u32> {
        Some(self.pid)
    }

    fn wait(&mut self) -> BoxFuture<'_, io::Result<Option<i32>>> {
        Box::pin(async move {
            if self.killed {
                return Ok(None);
            }
            match self.exit_rx.as_mut() {
                Some(rx) => match rx.await {
                    Ok(code) => Ok(Some(code)),
                    // Control dropped without exiting: behave like a hung process.
                    Err(_) => std::future::pending().await,
                },
                None => std::future::pending().await,
            }
        })
    }

    fn kill(&mut self) -> BoxFuture<'_, io::Result<()>> {
        Box::pin(async move {
            self.killed = true;
            self.kills.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }
}

/// Test-side controls for one scripted process.
pub struct ScriptedProcess {
    pub spec: CommandSpec,
    pub handle: ProcessHandle,
    stdout: Option<DuplexStream>,
    stderr: Option<DuplexStream>,
    exit_tx: Option<oneshot::Sender<i32>>,
    kills: Arc<AtomicUsize>,
}

impl ScriptedProcess {
    /// Deliver one chunk on stdout, exactly as given.
    pub async fn stdout_chunk(&mut self, bytes: &[u8]) -> io::Result<()> {
        write_chunk(self.stdout.as_mut(), bytes).await
    }

    pub async fn stderr_chunk(&mut self, bytes: &[u8]) -> io::Result<()> {
        write_chunk(self.stderr.as_mut(), bytes).await
    }

    /// Close both pipes (end-of-stream).
    pub fn close_output(&mut self) {
        self.stdout = None;
        self.stderr = None;
    }

    /// Close the pipes and let the process exit with `code`.
    pub fn exit(&mut self, code: i32) {
        self.close_output();
        if let Some(tx) = self.exit_tx.take() {
            let _ = tx.send(code);
        }
    }

    /// Let the process exit with `code` but keep both pipes open, like a
    /// child that leaves a background writer behind.
    pub fn exit_keeping_output(&mut self, code: i32) {
        if let Some(tx) = self.exit_tx.take() {
            let _ = tx.send(code);
        }
    }

    /// How many times the reaper actually killed this child.
    pub fn kill_count(&self) -> usize {
        self.kills.load(Ordering::SeqCst)
    }
}

async fn write_chunk(pipe: Option<&mut DuplexStream>, bytes: &[u8]) -> io::Result<()> {
    let pipe = pipe.ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed"))?;
    pipe.write_all(bytes).await?;
    pipe.flush().await
}

/// A `ProcessBackend` that hands every spawned process to the test.
///
/// Programs listed via [`ScriptedBackend::missing`] fail to spawn with
/// `NotFound`, like a real missing binary.
pub struct ScriptedBackend {
    spawned: mpsc::UnboundedSender<ScriptedProcess>,
    missing: HashSet<String>,
}

impl ScriptedBackend {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ScriptedProcess>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                spawned: tx,
                missing: HashSet::new(),
            },
            rx,
        )
    }

    pub fn missing(mut self, program: &str) -> Self {
        self.missing.insert(program.to_string());
        self
    }
}

impl ProcessBackend for ScriptedBackend {
    fn spawn(&self, spec: &CommandSpec) -> Result<SpawnedProcess> {
        if self.missing.contains(spec.program()) {
            return Err(CmdStreamError::Spawn {
                program: spec.program().to_string(),
                source: io::Error::new(io::ErrorKind::NotFound, "No such file or directory"),
            });
        }

        let (stdout_w, stdout_r) = tokio::io::duplex(1024);
        let (stderr_w, stderr_r) = tokio::io::duplex(1024);
        let (exit_tx, exit_rx) = oneshot::channel();
        let kills = Arc::new(AtomicUsize::new(0));

        let child = ScriptedChild {
            pid: NEXT_FAKE_PID.fetch_add(1, Ordering::Relaxed),
            exit_rx: Some(exit_rx),
            killed: false,
            kills: Arc::clone(&kills),
        };
        let handle = ProcessHandle::supervise(child);

        let control = ScriptedProcess {
            spec: spec.clone(),
            handle: handle.clone(),
            stdout: Some(stdout_w),
            stderr: Some(stderr_w),
            exit_tx: Some(exit_tx),
            kills,
        };
        // The test may have stopped listening; the process still runs.
        let _ = self.spawned.send(control);

        Ok(SpawnedProcess {
            handle,
            stdout: Box::pin(stdout_r),
            stderr: Box::pin(stderr_r),
        })
    }
}
