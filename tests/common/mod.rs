#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use cmdstream::engine::{SessionContext, SessionOptions};
use cmdstream::exec::{ProcessBackend, SystemBackend};
use cmdstream::types::RequestId;

pub use cmdstream_test_utils::scripted::{ScriptedBackend, ScriptedProcess};
pub use cmdstream_test_utils::{collect_events, init_tracing, payloads, with_timeout};

/// Session context backed by real OS processes.
pub fn system_context() -> SessionContext {
    SessionContext::new(Arc::new(SystemBackend), SessionOptions::default())
}

/// Session context backed by `backend`, with a short drain grace.
pub fn context_with(backend: impl ProcessBackend + 'static) -> SessionContext {
    let options = SessionOptions {
        exit_drain_grace: Duration::from_millis(100),
        ..SessionOptions::default()
    };
    SessionContext::new(Arc::new(backend), options)
}

/// Poll until `id` shows up in the registry.
pub async fn wait_until_registered(ctx: &SessionContext, id: RequestId) {
    for _ in 0..200 {
        if ctx.registry.contains(id) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("session {id} never registered its process");
}

/// Poll until `count` sessions are subscribed to the fault broadcast.
pub async fn wait_for_subscribers(ctx: &SessionContext, count: usize) {
    for _ in 0..200 {
        if ctx.faults.subscriber_count() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("only {} of {count} sessions subscribed", ctx.faults.subscriber_count());
}

/// Poll until `id` has been removed from the registry.
pub async fn wait_until_unregistered(ctx: &SessionContext, id: RequestId) {
    for _ in 0..200 {
        if !ctx.registry.contains(id) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("session {id} never released its process");
}
