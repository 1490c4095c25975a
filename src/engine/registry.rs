// src/engine/registry.rs

//! Shared table of in-flight processes, keyed by request id.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::exec::ProcessHandle;
use crate::types::RequestId;

/// Maps each streaming request to its process handle.
///
/// An id is present exactly while its process has not been cleaned up.
/// The lock is never held across an `.await`.
#[derive(Debug, Default)]
pub struct ProcessRegistry {
    inner: Mutex<HashMap<RequestId, ProcessHandle>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience for the common shared form.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<RequestId, ProcessHandle>> {
        // A panic while holding the lock cannot leave the map half-updated,
        // so a poisoned lock is still safe to use.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Track `handle` under `id`, replacing (and returning) any previous entry.
    pub fn register(&self, id: RequestId, handle: ProcessHandle) -> Option<ProcessHandle> {
        debug!(request_id = %id, pid = ?handle.pid(), "registering process");
        self.entries().insert(id, handle)
    }

    pub fn lookup(&self, id: RequestId) -> Option<ProcessHandle> {
        self.entries().get(&id).cloned()
    }

    /// Remove `id`. Removing an absent id is a no-op and returns `None`.
    pub fn unregister(&self, id: RequestId) -> Option<ProcessHandle> {
        let removed = self.entries().remove(&id);
        if removed.is_some() {
            debug!(request_id = %id, "unregistered process");
        }
        removed
    }

    pub fn contains(&self, id: RequestId) -> bool {
        self.entries().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Snapshot of the currently tracked ids, sorted.
    pub fn ids(&self) -> Vec<RequestId> {
        let mut ids: Vec<_> = self.entries().keys().copied().collect();
        ids.sort();
        ids
    }
}
