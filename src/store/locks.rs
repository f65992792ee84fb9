// src/store/locks.rs

use std::sync::{Arc, Mutex};

use dashmap::DashMap;

/// One mutex per key.
///
/// Writers to the same key are serialized; writers to different keys only
/// touch their own shard of the map and never wait on each other.
#[derive(Debug, Default)]
pub struct KeyLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the lock for `key`.
    pub fn with_key<R>(&self, key: &str, f: impl FnOnce() -> R) -> R {
        let lock = self
            .locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f()
    }
}
