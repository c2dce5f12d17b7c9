//! Cache Metrics Collection
//!
//! In-process counters for monitoring cache behaviour. All counters are
//! relaxed atomics; a snapshot is a consistent-enough point-in-time copy.

use std::sync::atomic::{AtomicU64, Ordering};

/// Cache metrics collector
#[derive(Debug, Default)]
pub struct CacheMetrics {
    // Lookup outcomes
    memory_hits: AtomicU64,
    memory_misses: AtomicU64,
    disk_hits: AtomicU64,
    disk_misses: AtomicU64,

    // Loader activity
    loader_calls: AtomicU64,
    loader_failures: AtomicU64,
    expired_fallbacks: AtomicU64,

    // Removal activity
    scope_evictions: AtomicU64,
    expiry_evictions: AtomicU64,
    swept_records: AtomicU64,
    reclaimed_records: AtomicU64,
}

impl CacheMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_memory_hit(&self) {
        self.memory_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_memory_miss(&self) {
        self.memory_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_disk_hit(&self) {
        self.disk_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_disk_miss(&self) {
        self.disk_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_loader_call(&self) {
        self.loader_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_loader_failure(&self) {
        self.loader_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_expired_fallback(&self) {
        self.expired_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_scope_eviction(&self) {
        self.scope_evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_expiry_eviction(&self) {
        self.expiry_evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_swept(&self, count: u64) {
        self.swept_records.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_reclaimed(&self, count: u64) {
        self.reclaimed_records.fetch_add(count, Ordering::Relaxed);
    }

    /// Point-in-time copy of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            memory_hits: self.memory_hits.load(Ordering::Relaxed),
            memory_misses: self.memory_misses.load(Ordering::Relaxed),
            disk_hits: self.disk_hits.load(Ordering::Relaxed),
            disk_misses: self.disk_misses.load(Ordering::Relaxed),
            loader_calls: self.loader_calls.load(Ordering::Relaxed),
            loader_failures: self.loader_failures.load(Ordering::Relaxed),
            expired_fallbacks: self.expired_fallbacks.load(Ordering::Relaxed),
            scope_evictions: self.scope_evictions.load(Ordering::Relaxed),
            expiry_evictions: self.expiry_evictions.load(Ordering::Relaxed),
            swept_records: self.swept_records.load(Ordering::Relaxed),
            reclaimed_records: self.reclaimed_records.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time metrics snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub memory_hits: u64,
    pub memory_misses: u64,
    pub disk_hits: u64,
    pub disk_misses: u64,
    pub loader_calls: u64,
    pub loader_failures: u64,
    pub expired_fallbacks: u64,
    pub scope_evictions: u64,
    pub expiry_evictions: u64,
    pub swept_records: u64,
    pub reclaimed_records: u64,
}

impl MetricsSnapshot {
    /// Fraction of lookups answered without calling the loader.
    pub fn hit_ratio(&self) -> f64 {
        let hits = (self.memory_hits + self.disk_hits) as f64;
        let total = hits + self.disk_misses as f64;
        if total == 0.0 {
            0.0
        } else {
            hits / total
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
