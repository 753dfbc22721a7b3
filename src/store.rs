// CLASSIFICATION: COMMUNITY
// Filename: store.rs v0.4
// Author: Lukas Bower
// Date Modified: 2026-03-28

//! Process-lifetime key-value store shared by every envelope call.
//! Values carry their write timestamp and vanish at process exit.

use crate::util::timestamp;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone)]
struct StoredValue {
    value: Value,
    written: u64,
}

/// Shared in-memory map with per-operation locking.
#[derive(Default)]
pub struct KvStore {
    inner: Mutex<HashMap<String, StoredValue>>,
}

impl KvStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: &str, value: Value) {
        let mut map = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        map.insert(
            key.to_string(),
            StoredValue {
                value,
                written: timestamp(),
            },
        );
    }

    /// Returns the value and its write timestamp.
    pub fn get(&self, key: &str) -> Option<(Value, u64)> {
        let map = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        map.get(key).map(|s| (s.value.clone(), s.written))
    }

    /// Returns true when the key existed.
    pub fn delete(&self, key: &str) -> bool {
        let mut map = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        map.remove(key).is_some()
    }

    /// Keys in sorted order for reproducible listings.
    pub fn keys(&self) -> Vec<String> {
        let map = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        let mut keys: Vec<String> = map.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn clear(&self) -> usize {
        let mut map = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        let n = map.len();
        map.clear();
        n
    }

    pub fn len(&self) -> usize {
        let map = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
