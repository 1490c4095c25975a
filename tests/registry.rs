// tests/registry.rs
mod common;
use crate::common::{ScriptedBackend, init_tracing, with_timeout};

use std::error::Error;
use std::sync::Arc;

use cmdstream::engine::ProcessRegistry;
use cmdstream::exec::{ProcessBackend, ProcessHandle};
use cmdstream::types::{CommandSpec, RequestId};

type TestResult = Result<(), Box<dyn Error>>;

fn scripted_handle(backend: &ScriptedBackend) -> Result<ProcessHandle, Box<dyn Error>> {
    Ok(backend.spawn(&CommandSpec::parse("sleep 30")?)?.handle)
}

#[tokio::test]
async fn register_lookup_unregister() -> TestResult {
    init_tracing();
    let (backend, _spawned) = ScriptedBackend::new();
    let registry = ProcessRegistry::new();

    let id = RequestId::next();
    let handle = scripted_handle(&backend)?;
    assert!(registry.register(id, handle.clone()).is_none());

    assert!(registry.contains(id));
    assert_eq!(registry.len(), 1);
    let found = registry.lookup(id).expect("registered id is found");
    assert_eq!(found.pid(), handle.pid());

    assert!(registry.unregister(id).is_some());
    assert!(registry.lookup(id).is_none());
    assert!(registry.is_empty());

    Ok(())
}

#[tokio::test]
async fn unregister_is_idempotent() -> TestResult {
    init_tracing();
    let (backend, _spawned) = ScriptedBackend::new();
    let registry = ProcessRegistry::new();

    let id = RequestId::next();
    registry.register(id, scripted_handle(&backend)?);

    assert!(registry.unregister(id).is_some());
    assert!(registry.unregister(id).is_none());
    assert!(registry.unregister(RequestId::next()).is_none());
    assert!(registry.is_empty());

    Ok(())
}

#[tokio::test]
async fn lookup_of_unknown_id_is_none() {
    let registry = ProcessRegistry::new();
    assert!(registry.lookup(RequestId::next()).is_none());
    assert!(!registry.contains(RequestId::next()));
}

#[tokio::test]
async fn registering_an_id_twice_returns_the_previous_handle() -> TestResult {
    init_tracing();
    let (backend, _spawned) = ScriptedBackend::new();
    let registry = ProcessRegistry::new();

    let id = RequestId::next();
    let first = scripted_handle(&backend)?;
    let second = scripted_handle(&backend)?;

    registry.register(id, first.clone());
    let previous = registry
        .register(id, second.clone())
        .expect("previous handle is returned");
    assert_eq!(previous.pid(), first.pid());
    assert_eq!(registry.lookup(id).and_then(|h| h.pid()), second.pid());
    assert_eq!(registry.len(), 1);

    Ok(())
}

#[tokio::test]
async fn request_ids_are_unique_and_ordered() {
    let a = RequestId::next();
    let b = RequestId::next();
    assert_ne!(a, b);
    assert!(a < b);
    assert_eq!(a.to_string(), format!("req-{}", a.as_u64()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_sessions_keep_their_own_entries() -> TestResult {
    init_tracing();
    let (backend, _spawned) = ScriptedBackend::new();
    let registry = ProcessRegistry::shared();

    let mut tasks = Vec::new();
    for _ in 0..32 {
        let registry = Arc::clone(&registry);
        let handle = scripted_handle(&backend)?;
        tasks.push(tokio::spawn(async move {
            let id = RequestId::next();
            registry.register(id, handle.clone());
            tokio::task::yield_now().await;
            let seen = registry.lookup(id).and_then(|h| h.pid());
            assert_eq!(seen, handle.pid());
            id
        }));
    }

    let mut ids = Vec::new();
    for task in tasks {
        ids.push(with_timeout(task).await?);
    }
    ids.sort();
    assert_eq!(registry.ids(), ids);

    // Remove half concurrently; the other half stays.
    let (gone, kept) = ids.split_at(ids.len() / 2);
    let mut removals = Vec::new();
    for &id in gone {
        let registry = Arc::clone(&registry);
        removals.push(tokio::spawn(async move { registry.unregister(id).is_some() }));
    }
    for removal in removals {
        assert!(with_timeout(removal).await?);
    }
    assert_eq!(registry.ids(), kept.to_vec());

    Ok(())
}
