//! Purpose: Per-handle write-through cache keyed by item identity or write hash.
//! Exports: `DbCache`.
//! Role: Best-effort advisory cache; never authoritative.
//! Invariants: All read-modify-write sequences hold the lock for their duration.
//! Invariants: `replace` swaps the whole mapping; it never merges.

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Mutex;

pub struct DbCache {
    entries: Mutex<HashMap<String, Value>>,
}

impl DbCache {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.lock().get(key).cloned()
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.lock().insert(key.into(), value);
    }

    pub fn remove(&self, key: &str) {
        self.lock().remove(key);
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Replaces the entire cache with a snapshot mapping.
    pub fn replace(&self, snapshot: Map<String, Value>) {
        let mut entries = self.lock();
        *entries = snapshot.into_iter().collect();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Value>> {
        self.entries
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }
}

impl Default for DbCache {
    fn default() -> Self {
        Self::new()
    }
}
