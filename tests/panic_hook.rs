// tests/panic_hook.rs
//
// The panic hook is process-wide, so it gets a test binary of its own.
mod common;
use crate::common::{
    ScriptedBackend, collect_events, context_with, init_tracing, payloads, wait_for_subscribers,
    wait_until_registered, with_timeout,
};

use std::error::Error;

use cmdstream::engine::{FaultKind, Session, SessionOutcome};
use cmdstream::exec::ProcessState;
use tokio::sync::mpsc;

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test]
async fn panic_anywhere_ends_streaming_sessions_with_an_error() -> TestResult {
    init_tracing();
    let (backend, mut spawned) = ScriptedBackend::new();
    let ctx = context_with(backend);
    ctx.faults.install_panic_hook();

    let (tx, rx) = mpsc::channel(16);
    let session = Session::open("long-job", &ctx, tx)?;
    let id = session.id();
    let run = tokio::spawn(session.run());
    let process = with_timeout(spawned.recv()).await.expect("process spawned");
    with_timeout(wait_until_registered(&ctx, id)).await;
    with_timeout(wait_for_subscribers(&ctx, 1)).await;

    // An unrelated task blows up.
    let crashed = tokio::spawn(async {
        panic!("worker exploded");
    })
    .await;
    assert!(crashed.is_err_and(|e| e.is_panic()));

    let events = with_timeout(collect_events(rx)).await;
    assert_eq!(payloads(&events), vec!["error:panic"]);
    assert_eq!(
        with_timeout(run).await??,
        SessionOutcome::Faulted(FaultKind::Panic)
    );

    with_timeout(process.handle.wait()).await;
    assert_eq!(process.kill_count(), 1);
    assert!(matches!(
        process.handle.state(),
        ProcessState::Terminated { killed: true, .. }
    ));
    assert!(ctx.registry.is_empty());

    Ok(())
}
