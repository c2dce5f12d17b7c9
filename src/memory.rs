//! Memory Layer
//!
//! In-process map from the flattened composite key to a [`Record`].
//! Uses DashMap for lock-free concurrent reads; insertion order is
//! irrelevant and scope evictions walk the canonical-key prefixes.

use dashmap::DashMap;

use crate::record::Record;

/// Concurrent in-memory record store
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, Record>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a record by its canonical key.
    pub fn get(&self, key: &str) -> Option<Record> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Insert or replace a record. Last writer wins.
    pub fn put(&self, key: impl Into<String>, record: Record) {
        self.entries.insert(key.into(), record);
    }

    /// Remove a single record.
    pub fn remove(&self, key: &str) -> Option<Record> {
        self.entries.remove(key).map(|(_, record)| record)
    }

    /// Remove every record whose canonical key starts with `prefix`.
    ///
    /// Returns the number of records removed. Used for scope evictions.
    pub fn remove_by_prefix(&self, prefix: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.starts_with(prefix));
        before.saturating_sub(self.entries.len())
    }

    /// Drop every record.
    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of the current canonical keys.
    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }
}

// =============================================================================
// Tests
// =============================================================================
