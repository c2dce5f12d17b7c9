//! Expired-Record Sweeper
//!
//! One pass over every persisted key, evicting records that are expirable and
//! expired under their stored lifetime. Runs once at startup, after
//! migrations and before the ready signal. Fails soft: a key that cannot be
//! read is skipped.

use std::sync::Arc;

use tracing::{debug, info};

use crate::metrics::CacheMetrics;
use crate::persistence::DiskStore;

/// Startup-time expired-record eviction pass
pub struct ExpiredRecordSweeper {
    disk: Arc<DiskStore>,
    metrics: Arc<CacheMetrics>,
}

impl ExpiredRecordSweeper {
    pub fn new(disk: Arc<DiskStore>, metrics: Arc<CacheMetrics>) -> Self {
        Self { disk, metrics }
    }

    /// Evict every expirable, expired record. Returns the evicted count.
    pub async fn sweep(&self) -> u64 {
        let mut evicted = 0u64;

        for canonical in self.disk.all_keys().await {
            let Some(record) = self.disk.retrieve_record(&canonical).await else {
                // Unreadable or torn: skip, the read path treats it as absent
                continue;
            };

            if record.expirable() && record.has_expired() {
                self.disk.evict(&canonical).await;
                evicted += 1;
            }
        }

        self.metrics.record_swept(evicted);
        if evicted > 0 {
            info!(evicted, "expired-record sweep complete");
        } else {
            debug!("expired-record sweep found nothing to evict");
        }

        evicted
    }
}

// =============================================================================
// Tests
// =============================================================================
