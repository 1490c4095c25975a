// src/engine/fault.rs

//! Process-wide fault broadcast.
//!
//! The monitor only signals; each session kills and deregisters its own
//! process when it observes a fault.

use std::fmt;
use std::future::Future;
use std::panic::PanicHookInfo;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Kinds of process-wide conditions that end every active session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultKind {
    /// A panic somewhere in the server.
    Panic,
    /// A supervised background task failed or panicked.
    TaskFailure,
    /// The server is shutting down.
    Shutdown,
}

impl FaultKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FaultKind::Panic => "panic",
            FaultKind::TaskFailure => "task_failure",
            FaultKind::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A broadcast fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub kind: FaultKind,
    pub message: String,
}

const FAULT_CHANNEL_CAPACITY: usize = 16;

/// Broadcasts faults to every subscribed session.
///
/// Cheap to clone; all clones share one channel.
#[derive(Debug, Clone)]
pub struct FaultMonitor {
    tx: broadcast::Sender<Fault>,
}

impl Default for FaultMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl FaultMonitor {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(FAULT_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Subscribe for the lifetime of the returned guard.
    pub fn subscribe(&self) -> FaultSubscription {
        FaultSubscription {
            rx: self.tx.subscribe(),
        }
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Broadcast a fault. Returns how many subscribers it reached.
    pub fn raise(&self, kind: FaultKind, message: impl Into<String>) -> usize {
        let fault = Fault {
            kind,
            message: message.into(),
        };
        if kind == FaultKind::Shutdown {
            info!(message = %fault.message, "broadcasting shutdown to active sessions");
        } else {
            error!(kind = %kind, message = %fault.message, "runtime fault; terminating active sessions");
        }
        // No subscribers simply means no session is streaming.
        self.tx.send(fault).unwrap_or(0)
    }

    /// Spawn `fut` and raise [`FaultKind::TaskFailure`] if it returns an
    /// error or panics.
    pub fn supervise<F, E>(&self, name: &'static str, fut: F) -> JoinHandle<()>
    where
        F: Future<Output = std::result::Result<(), E>> + Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        let monitor = self.clone();
        let task = tokio::spawn(fut);

        tokio::spawn(async move {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    monitor.raise(FaultKind::TaskFailure, format!("{name} failed: {e}"));
                }
                Err(join_err) if join_err.is_panic() => {
                    monitor.raise(FaultKind::TaskFailure, format!("{name} panicked"));
                }
                Err(join_err) => {
                    warn!(task = name, error = %join_err, "supervised task cancelled");
                }
            }
        })
    }

    /// Install a process-wide panic hook that raises [`FaultKind::Panic`].
    ///
    /// The previously installed hook still runs first.
    pub fn install_panic_hook(&self) {
        let monitor = self.clone();
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info: &PanicHookInfo<'_>| {
            previous(info);
            monitor.raise(FaultKind::Panic, panic_message(info));
        }));
    }
}

fn panic_message(info: &PanicHookInfo<'_>) -> String {
    let payload = info
        .payload()
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| info.payload().downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());

    match info.location() {
        Some(loc) => format!("{payload} at {}:{}", loc.file(), loc.line()),
        None => payload,
    }
}

/// A session's subscription to the fault broadcast.
///
/// Dropping it unsubscribes.
#[derive(Debug)]
pub struct FaultSubscription {
    rx: broadcast::Receiver<Fault>,
}

impl FaultSubscription {
    /// Wait for the next fault.
    ///
    /// Never resolves if the monitor is gone. A lagged subscriber still
    /// receives one of the retained faults. Cancel safe.
    pub async fn recv(&mut self) -> Fault {
        loop {
            match self.rx.recv().await {
                Ok(fault) => return fault,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "fault subscription lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return std::future::pending().await;
                }
            }
        }
    }
}
