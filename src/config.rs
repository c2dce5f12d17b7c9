//! Cache Configuration
//!
//! [`StrataBuilder`] is the only way to construct a cache handle; its
//! terminal call names the persistence directory, which is the one required
//! setting.

use std::path::PathBuf;
use std::sync::Arc;

use crate::codec::{JsonCodec, RecordCodec};
use crate::error::{Error, Result};
use crate::migration::Migration;
use crate::pipeline::Strata;

/// Default disk budget in megabytes
pub const DEFAULT_MAX_MB: u64 = 100;

/// Resolved cache configuration
#[derive(Clone)]
pub struct CacheConfig {
    /// Root of the persistence store
    pub cache_directory: PathBuf,
    /// Serve a stale record when the loader fails or returns nothing
    pub use_expired_data_if_loader_not_available: bool,
    /// Disk budget for reclamation, in megabytes
    pub max_mb_persistence_cache: u64,
    /// Escape reserved separators in user keys instead of rejecting them
    pub escape_keys: bool,
    /// Ordered schema migration steps
    pub migrations: Vec<Migration>,
    /// On-disk record codec
    pub codec: Arc<dyn RecordCodec>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_directory: PathBuf::new(),
            use_expired_data_if_loader_not_available: false,
            max_mb_persistence_cache: DEFAULT_MAX_MB,
            escape_keys: false,
            migrations: Vec::new(),
            codec: Arc::new(JsonCodec::new()),
        }
    }
}

impl CacheConfig {
    /// Reject configurations missing the required directory.
    pub fn validate(&self) -> Result<()> {
        if self.cache_directory.as_os_str().is_empty() {
            return Err(Error::InvalidConfig("cache_directory".into()));
        }
        Ok(())
    }
}

impl std::fmt::Debug for CacheConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheConfig")
            .field("cache_directory", &self.cache_directory)
            .field(
                "use_expired_data_if_loader_not_available",
                &self.use_expired_data_if_loader_not_available,
            )
            .field("max_mb_persistence_cache", &self.max_mb_persistence_cache)
            .field("escape_keys", &self.escape_keys)
            .field("migrations", &self.migrations.len())
            .field("codec", &self.codec.name())
            .finish()
    }
}

/// Builder for a [`Strata`] cache handle
#[derive(Debug, Default)]
pub struct StrataBuilder {
    config: CacheConfig,
}

impl StrataBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve already-expired records instead of failing when the loader
    /// yields nothing. Default: `false`.
    pub fn use_expired_data_if_loader_not_available(mut self, enabled: bool) -> Self {
        self.config.use_expired_data_if_loader_not_available = enabled;
        self
    }

    /// Disk budget for all stored records, in megabytes. Default: 100.
    pub fn max_mb_persistence_cache(mut self, max_mb: u64) -> Self {
        self.config.max_mb_persistence_cache = max_mb;
        self
    }

    /// Percent-escape reserved separators in user keys instead of rejecting
    /// them. Default: `false`.
    pub fn escape_keys(mut self, enabled: bool) -> Self {
        self.config.escape_keys = enabled;
        self
    }

    /// Ordered schema migration steps, applied at startup.
    pub fn migrations(mut self, migrations: Vec<Migration>) -> Self {
        self.config.migrations = migrations;
        self
    }

    /// Override the on-disk record codec. Default: compact JSON.
    pub fn codec(mut self, codec: Arc<dyn RecordCodec>) -> Self {
        self.config.codec = codec;
        self
    }

    /// Name the persistence directory and build the cache handle.
    ///
    /// Startup (migrations + expired-record sweep) begins on a background
    /// task; requests block on it transparently.
    pub async fn persistence(mut self, cache_directory: impl Into<PathBuf>) -> Result<Strata> {
        self.config.cache_directory = cache_directory.into();
        self.config.validate()?;
        Strata::with_config(self.config).await
    }
}

// =============================================================================
// Tests
// =============================================================================
