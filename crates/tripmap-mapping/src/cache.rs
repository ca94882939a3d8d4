//! Cache store
//!
//! Keyed side channel for values computed in one branch of a traversal
//! and read back in another through the reserved cache prefix.

use serde_json::Value;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use tracing::debug;

/// First-write-wins store of cached subtrees
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CacheStore {
    entries: HashMap<String, Value>,
}

impl CacheStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `key` unless the key is already present.
    ///
    /// Returns whether the value was stored.
    pub fn insert_first(&mut self, key: impl Into<String>, value: Value) -> bool {
        match self.entries.entry(key.into()) {
            Entry::Occupied(slot) => {
                debug!(key = %slot.key(), "cache key already populated, keeping first value");
                false
            }
            Entry::Vacant(slot) => {
                debug!(key = %slot.key(), "cached value");
                slot.insert(value);
                true
            }
        }
    }

    /// Cached value for `key`
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every cached value
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Cached keys, sorted
    #[must_use]
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }
}
