//! Two-Tier Cache
//!
//! Orchestrates the memory and disk layers behind a single contract:
//! memory-first lookup with promotion from disk, TTL enforcement, scope
//! evictions over canonical-key prefixes, and the disk-size budget.
//!
//! # Budget reclamation
//!
//! After every save, while disk usage exceeds the configured budget,
//! expirable records are deleted in ascending canonical-key order (memory
//! entries for deleted keys go too). Non-expirable records are never touched,
//! so usage settles either under the budget or at an all-non-expirable
//! residue. There is no LRU; this is the sole growth bound.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use crate::key::{self, CompositeKey};
use crate::memory::MemoryStore;
use crate::metrics::CacheMetrics;
use crate::persistence::DiskStore;
use crate::record::{Record, Source};

/// Memory + disk cache with TTL, scope eviction, and a disk budget
pub struct TwoTierCache {
    memory: MemoryStore,
    disk: Arc<DiskStore>,
    max_mb: u64,
    metrics: Arc<CacheMetrics>,
    /// Serializes reclamation passes so concurrent saves don't race the walk.
    reclaim_lock: Mutex<()>,
}

impl TwoTierCache {
    pub fn new(disk: Arc<DiskStore>, max_mb: u64, metrics: Arc<CacheMetrics>) -> Self {
        Self {
            memory: MemoryStore::new(),
            disk,
            max_mb,
            metrics,
            reclaim_lock: Mutex::new(()),
        }
    }

    /// Look up a record: memory first, then disk with promotion to memory.
    ///
    /// The expiry check runs against the caller-supplied lifetime
    /// (`0` = never expires). An expired record is returned anyway when
    /// `allow_expired` is set, leaving the stale-data policy to the pipeline;
    /// otherwise it is evicted from both layers and the lookup is a miss.
    pub async fn retrieve(
        &self,
        cache_key: &CompositeKey,
        allow_expired: bool,
        lifetime_millis: u64,
    ) -> Option<Record> {
        let canonical = cache_key.canonical();

        let (record, source) = match self.memory.get(&canonical) {
            Some(record) => {
                self.metrics.record_memory_hit();
                (record, Source::Memory)
            }
            None => {
                self.metrics.record_memory_miss();
                match self.disk.retrieve_record(&canonical).await {
                    Some(record) => {
                        self.metrics.record_disk_hit();
                        self.memory.put(canonical.clone(), record.clone());
                        (record, Source::Disk)
                    }
                    None => {
                        self.metrics.record_disk_miss();
                        return None;
                    }
                }
            }
        };

        if !record.is_expired(lifetime_millis) || allow_expired {
            return Some(record.with_source(source));
        }

        self.metrics.record_expiry_eviction();
        self.memory.remove(&canonical);
        self.disk.evict(&canonical).await;
        None
    }

    /// Store a payload under the composite key, then enforce the disk budget.
    pub async fn save(
        &self,
        cache_key: &CompositeKey,
        payload: Value,
        type_tag: String,
        lifetime_millis: u64,
        expirable: bool,
    ) {
        let canonical = cache_key.canonical();
        let record = Record::new(payload, type_tag, lifetime_millis, expirable);

        self.memory.put(canonical.clone(), record.clone());
        self.disk.save(&canonical, &record).await;
        self.reclaim_budget().await;
    }

    /// Delete expirable disk records, smallest canonical key first, until
    /// usage drops under the budget or only non-expirable records remain.
    async fn reclaim_budget(&self) {
        let budget_bytes = self.max_mb * 1024 * 1024;
        if self.disk.stored_bytes().await <= budget_bytes {
            return;
        }

        let _guard = self.reclaim_lock.lock().await;

        let mut entries = self.disk.entry_sizes().await;
        let mut used: u64 = entries.iter().map(|(_, size)| size).sum();
        if used <= budget_bytes {
            return;
        }

        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let mut reclaimed = 0u64;
        for (canonical, size) in entries {
            if used <= budget_bytes {
                break;
            }
            let Some(record) = self.disk.retrieve_record(&canonical).await else {
                continue;
            };
            if !record.expirable() {
                continue;
            }

            self.disk.evict(&canonical).await;
            self.memory.remove(&canonical);
            used = used.saturating_sub(size);
            reclaimed += 1;
        }

        if reclaimed > 0 {
            self.metrics.record_reclaimed(reclaimed);
            debug!(
                reclaimed,
                used_bytes = used,
                budget_bytes,
                "budget reclamation pass complete"
            );
        }
    }

    // =========================================================================
    // Scope evictions
    // =========================================================================

    /// Remove every record of a provider, in both layers.
    pub async fn evict_provider_key(&self, provider: &str) {
        self.metrics.record_scope_eviction();
        self.memory.remove(&key::provider_exact(provider));
        self.memory.remove_by_prefix(&key::provider_prefix(provider));
        self.evict_disk_scope(&key::provider_exact(provider), &key::provider_prefix(provider))
            .await;
    }

    /// Remove every record under `(provider, dynamic)`, in both layers.
    pub async fn evict_dynamic_key(&self, provider: &str, dynamic: &str) {
        self.metrics.record_scope_eviction();
        self.memory.remove(&key::dynamic_exact(provider, dynamic));
        self.memory
            .remove_by_prefix(&key::dynamic_prefix(provider, dynamic));
        self.evict_disk_scope(
            &key::dynamic_exact(provider, dynamic),
            &key::dynamic_prefix(provider, dynamic),
        )
        .await;
    }

    /// Remove the single `(provider, dynamic, group)` record, in both layers.
    pub async fn evict_dynamic_key_group(&self, provider: &str, dynamic: &str, group: &str) {
        self.metrics.record_scope_eviction();
        let canonical = key::group_exact(provider, dynamic, group);
        self.memory.remove(&canonical);
        self.disk.evict(&canonical).await;
    }

    /// Clear both layers entirely.
    pub async fn evict_all(&self) {
        self.metrics.record_scope_eviction();
        self.memory.clear();
        self.disk.evict_all().await;
    }

    async fn evict_disk_scope(&self, exact: &str, prefix: &str) {
        self.disk.evict(exact).await;
        for canonical in self.disk.all_keys().await {
            if canonical.starts_with(prefix) {
                self.disk.evict(&canonical).await;
            }
        }
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    pub fn max_mb(&self) -> u64 {
        self.max_mb
    }

    pub async fn stored_mb(&self) -> f64 {
        self.disk.stored_mb().await
    }

    pub fn memory_entries(&self) -> usize {
        self.memory.len()
    }

    pub(crate) fn disk(&self) -> &Arc<DiskStore> {
        &self.disk
    }

    #[cfg(test)]
    pub(crate) fn memory(&self) -> &MemoryStore {
        &self.memory
    }
}

impl std::fmt::Debug for TwoTierCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwoTierCache")
            .field("max_mb", &self.max_mb)
            .field("memory_entries", &self.memory.len())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
