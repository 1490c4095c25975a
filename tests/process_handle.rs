// tests/process_handle.rs
//
// Real OS processes behind `ProcessHandle`.
mod common;
use crate::common::{ScriptedBackend, init_tracing, with_timeout};

use std::error::Error;

use cmdstream::errors::CmdStreamError;
use cmdstream::exec::{FramedReader, ProcessBackend, ProcessState, spawn};
use cmdstream::types::CommandSpec;

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test]
async fn echo_exits_zero_and_reports_its_output() -> TestResult {
    init_tracing();

    let spawned = spawn(&CommandSpec::parse("echo hello")?)?;
    assert!(spawned.handle.pid().is_some());

    let mut stdout = FramedReader::new(spawned.stdout);
    assert_eq!(stdout.next_line().await?, Some("hello".to_string()));
    assert_eq!(stdout.next_line().await?, None);

    let code = with_timeout(spawned.handle.wait()).await;
    assert_eq!(code, 0);
    assert_eq!(
        spawned.handle.state(),
        ProcessState::Terminated { code: 0, killed: false }
    );

    Ok(())
}

#[tokio::test]
async fn non_zero_exit_code_is_reported() -> TestResult {
    init_tracing();

    let spawned = spawn(&CommandSpec::parse("false")?)?;
    let code = with_timeout(spawned.handle.wait()).await;
    assert_ne!(code, 0);

    Ok(())
}

#[tokio::test]
async fn missing_program_is_a_spawn_error() -> TestResult {
    init_tracing();

    match spawn(&CommandSpec::parse("doesnotexist123 --flag")?) {
        Err(CmdStreamError::Spawn { program, source }) => {
            assert_eq!(program, "doesnotexist123");
            assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
        }
        Err(e) => panic!("expected Spawn error, got: {e:?}"),
        Ok(_) => panic!("expected spawn to fail"),
    }

    Ok(())
}

#[tokio::test]
async fn kill_is_idempotent() -> TestResult {
    init_tracing();

    let spawned = spawn(&CommandSpec::parse("sleep 30")?)?;
    let handle = spawned.handle.clone();

    assert!(handle.kill(), "first kill issues the request");
    assert!(!handle.kill(), "second kill is a no-op");
    assert!(!spawned.handle.kill(), "clones share the kill state");

    let code = with_timeout(handle.wait()).await;
    assert_eq!(code, cmdstream::exec::process::SIGNAL_EXIT_CODE);
    assert!(matches!(
        handle.state(),
        ProcessState::Terminated { killed: true, .. }
    ));

    assert!(!handle.kill(), "killing a terminated process is a no-op");

    Ok(())
}

#[tokio::test]
async fn kill_after_natural_exit_is_a_no_op() -> TestResult {
    init_tracing();

    let spawned = spawn(&CommandSpec::parse("true")?)?;
    let code = with_timeout(spawned.handle.wait()).await;
    assert_eq!(code, 0);

    assert!(!spawned.handle.kill());
    assert_eq!(
        spawned.handle.state(),
        ProcessState::Terminated { code: 0, killed: false }
    );

    Ok(())
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn dropping_every_handle_kills_the_process() -> TestResult {
    init_tracing();

    let spawned = spawn(&CommandSpec::parse("sleep 30")?)?;
    let pid = spawned.handle.pid().expect("real process has a pid");
    let proc_entry = std::path::PathBuf::from(format!("/proc/{pid}"));
    assert!(proc_entry.exists());
    drop(spawned);

    // The entry disappears once the process is killed and reaped.
    let mut gone = false;
    for _ in 0..200 {
        if !proc_entry.exists() {
            gone = true;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert!(gone, "process {pid} outlived its handles");

    Ok(())
}

#[tokio::test]
async fn concurrent_waiters_all_see_the_same_exit_code() -> TestResult {
    init_tracing();

    let spawned = spawn(&CommandSpec::parse("false")?)?;
    let a = spawned.handle.clone();
    let b = spawned.handle.clone();

    let (code_a, code_b) = with_timeout(async { tokio::join!(a.wait(), b.wait()) }).await;
    assert_ne!(code_a, 0);
    assert_eq!(code_a, code_b);
    assert_eq!(spawned.handle.state().exit_code(), Some(code_a));

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn kill_request_reaps_a_child_on_a_worker_thread() -> TestResult {
    init_tracing();
    let (backend, mut spawned) = ScriptedBackend::new();

    let handle = backend.spawn(&CommandSpec::parse("idle")?)?.handle;
    let process = with_timeout(spawned.recv()).await.expect("process spawned");

    assert!(handle.kill());
    assert_eq!(with_timeout(handle.wait()).await, cmdstream::exec::process::SIGNAL_EXIT_CODE);
    assert_eq!(process.kill_count(), 1);
    assert_eq!(
        handle.state(),
        ProcessState::Terminated {
            code: cmdstream::exec::process::SIGNAL_EXIT_CODE,
            killed: true
        }
    );

    Ok(())
}
