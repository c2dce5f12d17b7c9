//! Request Pipeline
//!
//! [`Strata`] is the cache handle. Each request flows through one pipeline:
//!
//! ```text
//! descriptor ──▶ startup gate ──▶ two-tier lookup ──┬─ hit, no evict ─▶ reply
//!                                                   │
//!                                                   └─ miss / evict ─▶ loader
//!                                                          │
//!                payload ◀── deep copy ◀── save ◀──────────┤ Some(payload)
//!                stale reply or NoDataFromLoader ◀──────────┘ None / error
//! ```
//!
//! The eviction directive fires on every loader path, success or not, so a
//! caller issuing an evicting request can rely on the scope being cleared.
//! The loader is never polled before the startup gate releases.

use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::cache::TwoTierCache;
use crate::config::{CacheConfig, StrataBuilder};
use crate::copy::DeepCopier;
use crate::descriptor::{EvictionDirective, RequestDescriptor};
use crate::error::{Error, LoaderError, Result};
use crate::metrics::{CacheMetrics, MetricsSnapshot};
use crate::migration::MigrationRunner;
use crate::persistence::DiskStore;
use crate::record::{Record, Reply, Response, Source};
use crate::startup::StartupGate;
use crate::sweeper::ExpiredRecordSweeper;

/// Reactive two-tier cache handle
///
/// Cheap to clone; all clones share the same layers and startup gate.
#[derive(Clone)]
pub struct Strata {
    inner: Arc<Inner>,
}

struct Inner {
    cache: TwoTierCache,
    config: CacheConfig,
    copier: DeepCopier,
    gate: StartupGate,
    metrics: Arc<CacheMetrics>,
}

impl Strata {
    /// Start configuring a cache handle.
    pub fn builder() -> StrataBuilder {
        StrataBuilder::new()
    }

    pub(crate) async fn with_config(config: CacheConfig) -> Result<Self> {
        let disk = Arc::new(
            DiskStore::open(&config.cache_directory, Arc::clone(&config.codec)).await?,
        );
        let metrics = Arc::new(CacheMetrics::new());
        let cache = TwoTierCache::new(
            Arc::clone(&disk),
            config.max_mb_persistence_cache,
            Arc::clone(&metrics),
        );
        let gate = StartupGate::spawn(
            MigrationRunner::new(Arc::clone(&disk), config.migrations.clone()),
            ExpiredRecordSweeper::new(disk, Arc::clone(&metrics)),
        );

        Ok(Self {
            inner: Arc::new(Inner {
                cache,
                config,
                copier: DeepCopier::new(),
                gate,
                metrics,
            }),
        })
    }

    /// Wait for startup (migrations + sweep) to finish.
    ///
    /// Requests do this implicitly; calling it up front surfaces a latched
    /// migration failure early.
    pub async fn ready(&self) -> Result<()> {
        self.inner.gate.wait_ready().await
    }

    // =========================================================================
    // Requests
    // =========================================================================

    /// Run one request, shaping the response per the descriptor.
    pub async fn request<T, F, Fut>(
        &self,
        descriptor: &RequestDescriptor,
        loader: F,
    ) -> Result<Response<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<Option<T>, LoaderError>>,
    {
        let reply = self.run(descriptor, loader).await?;
        Ok(if descriptor.detailed_response() {
            Response::Detailed(reply)
        } else {
            Response::Payload(reply.payload)
        })
    }

    /// Run one request and return the bare payload.
    pub async fn get<T, F, Fut>(&self, descriptor: &RequestDescriptor, loader: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<Option<T>, LoaderError>>,
    {
        Ok(self.run(descriptor, loader).await?.payload)
    }

    /// Run one request and return the payload together with its origin.
    pub async fn get_detailed<T, F, Fut>(
        &self,
        descriptor: &RequestDescriptor,
        loader: F,
    ) -> Result<Reply<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<Option<T>, LoaderError>>,
    {
        self.run(descriptor, loader).await
    }

    /// The pipeline proper: gate, lookup, loader fallback, directive, save.
    async fn run<T, F, Fut>(&self, descriptor: &RequestDescriptor, loader: F) -> Result<Reply<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<Option<T>, LoaderError>>,
    {
        self.inner.gate.wait_ready().await?;

        let cache_key = descriptor.cache_key(self.inner.config.escape_keys)?;
        let allow_expired = self.inner.config.use_expired_data_if_loader_not_available;

        let cached = self
            .inner
            .cache
            .retrieve(&cache_key, allow_expired, descriptor.lifetime_millis())
            .await;

        if let Some(record) = &cached {
            // A fresh record short-circuits the loader. An expired one (only
            // present when the stale-data policy is on) is held back as a
            // fallback for a failing loader.
            let fresh = !record.is_expired(descriptor.lifetime_millis());
            if fresh && !descriptor.eviction().evicts() {
                return self.reply_from(record);
            }
        }

        self.inner.metrics.record_loader_call();
        match loader().await {
            Ok(Some(payload)) => {
                self.apply_eviction(descriptor).await;

                let value = self.inner.copier.to_value(&payload)?;
                let type_tag = descriptor
                    .type_tag()
                    .map(str::to_string)
                    .unwrap_or_else(|| std::any::type_name::<T>().to_string());
                self.inner
                    .cache
                    .save(
                        &cache_key,
                        value,
                        type_tag,
                        descriptor.lifetime_millis(),
                        descriptor.expirable(),
                    )
                    .await;

                // The cache holds a serialized copy; the loader's own value
                // goes back to the caller untouched.
                Ok(Reply::new(payload, Source::Cloud))
            }
            Ok(None) => {
                debug!(
                    provider = descriptor.provider_key(),
                    "loader returned no payload"
                );
                self.loader_fallback(descriptor, cached, None).await
            }
            Err(cause) => {
                self.inner.metrics.record_loader_failure();
                debug!(
                    provider = descriptor.provider_key(),
                    error = %cause,
                    "loader failed"
                );
                self.loader_fallback(descriptor, cached, Some(cause.to_string()))
                    .await
            }
        }
    }

    /// Loader produced nothing: serve the prior record if policy allows,
    /// otherwise fail. The eviction directive fires either way.
    async fn loader_fallback<T: DeserializeOwned>(
        &self,
        descriptor: &RequestDescriptor,
        cached: Option<Record>,
        cause: Option<String>,
    ) -> Result<Reply<T>> {
        self.apply_eviction(descriptor).await;

        if self.inner.config.use_expired_data_if_loader_not_available {
            if let Some(record) = cached {
                self.inner.metrics.record_expired_fallback();
                return self.reply_from(&record);
            }
        }

        Err(Error::NoDataFromLoader {
            provider_key: descriptor.provider_key().to_string(),
            cause,
        })
    }

    /// Deep-copy a record payload into a typed reply.
    fn reply_from<T: DeserializeOwned>(&self, record: &Record) -> Result<Reply<T>> {
        let payload = self.inner.copier.materialize(record.payload())?;
        Ok(Reply::new(payload, record.source()))
    }

    /// Clear whatever scope the descriptor demands.
    async fn apply_eviction(&self, descriptor: &RequestDescriptor) {
        let provider = descriptor.provider_key();
        match descriptor.eviction() {
            EvictionDirective::None => {}
            EvictionDirective::All => self.inner.cache.evict_all().await,
            EvictionDirective::Provider => self.inner.cache.evict_provider_key(provider).await,
            EvictionDirective::DynamicKey => {
                if let Some(dynamic) = descriptor.dynamic_key() {
                    self.inner.cache.evict_dynamic_key(provider, dynamic).await;
                }
            }
            EvictionDirective::DynamicKeyGroup => {
                if let (Some(dynamic), Some(group)) =
                    (descriptor.dynamic_key(), descriptor.group_key())
                {
                    self.inner
                        .cache
                        .evict_dynamic_key_group(provider, dynamic, group)
                        .await;
                }
            }
        }
    }

    // =========================================================================
    // Explicit evictions
    // =========================================================================

    /// Remove every record of a provider.
    pub async fn evict_provider(&self, provider_key: &str) -> Result<()> {
        self.inner.gate.wait_ready().await?;
        self.inner.cache.evict_provider_key(provider_key).await;
        Ok(())
    }

    /// Remove every record under `(provider, dynamic)`.
    pub async fn evict_dynamic_key(&self, provider_key: &str, dynamic_key: &str) -> Result<()> {
        self.inner.gate.wait_ready().await?;
        self.inner
            .cache
            .evict_dynamic_key(provider_key, dynamic_key)
            .await;
        Ok(())
    }

    /// Remove the single `(provider, dynamic, group)` record.
    pub async fn evict_dynamic_key_group(
        &self,
        provider_key: &str,
        dynamic_key: &str,
        group_key: &str,
    ) -> Result<()> {
        self.inner.gate.wait_ready().await?;
        self.inner
            .cache
            .evict_dynamic_key_group(provider_key, dynamic_key, group_key)
            .await;
        Ok(())
    }

    /// Clear both layers entirely.
    pub async fn evict_all(&self) -> Result<()> {
        self.inner.gate.wait_ready().await?;
        self.inner.cache.evict_all().await;
        Ok(())
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Point-in-time metrics snapshot.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    /// Best-effort disk usage in megabytes.
    pub async fn stored_mb(&self) -> f64 {
        self.inner.cache.stored_mb().await
    }

    /// The resolved configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }
}

impl std::fmt::Debug for Strata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Strata")
            .field("cache_directory", &self.inner.config.cache_directory)
            .field("ready", &self.inner.gate.is_ready())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct User {
        id: u64,
        name: String,
    }

    fn ada() -> User {
        User {
            id: 1,
            name: "ada".into(),
        }
    }

    async fn open_cache(dir: &TempDir) -> Strata {
        Strata::builder().persistence(dir.path()).await.unwrap()
    }

    fn users_descriptor() -> RequestDescriptor {
        RequestDescriptor::builder("users")
            .lifetime(Duration::from_secs(60))
            .type_tag("User")
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_miss_calls_loader_and_returns_cloud() {
        let dir = TempDir::new().unwrap();
        let cache = open_cache(&dir).await;

        let reply = cache
            .get_detailed(&users_descriptor(), || async { Ok(Some(ada())) })
            .await
            .unwrap();

        assert_eq!(reply.payload, ada());
        assert_eq!(reply.source, Source::Cloud);
    }

    #[tokio::test]
    async fn test_hit_skips_loader() {
        let dir = TempDir::new().unwrap();
        let cache = open_cache(&dir).await;
        let descriptor = users_descriptor();

        cache
            .get::<User, _, _>(&descriptor, || async { Ok(Some(ada())) })
            .await
            .unwrap();

        let loader_ran = AtomicUsize::new(0);
        let reply = cache
            .get_detailed::<User, _, _>(&descriptor, || {
                loader_ran.fetch_add(1, Ordering::SeqCst);
                async { Ok(Some(User { id: 2, name: "other".into() })) }
            })
            .await
            .unwrap();

        assert_eq!(loader_ran.load(Ordering::SeqCst), 0);
        assert_eq!(reply.payload, ada());
        assert_eq!(reply.source, Source::Memory);
    }

    #[tokio::test]
    async fn test_loader_error_without_fallback_fails() {
        let dir = TempDir::new().unwrap();
        let cache = open_cache(&dir).await;

        let err = cache
            .get::<User, _, _>(&users_descriptor(), || async {
                Err("upstream is down".into())
            })
            .await
            .unwrap_err();

        match err {
            Error::NoDataFromLoader {
                provider_key,
                cause,
            } => {
                assert_eq!(provider_key, "users");
                assert_eq!(cause.as_deref(), Some("upstream is down"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_loader_none_without_fallback_fails() {
        let dir = TempDir::new().unwrap();
        let cache = open_cache(&dir).await;

        let err = cache
            .get::<User, _, _>(&users_descriptor(), || async { Ok(None) })
            .await
            .unwrap_err();

        assert!(matches!(err, Error::NoDataFromLoader { cause: None, .. }));
    }

    #[tokio::test]
    async fn test_expired_record_served_when_loader_fails() {
        let dir = TempDir::new().unwrap();
        let cache = Strata::builder()
            .use_expired_data_if_loader_not_available(true)
            .persistence(dir.path())
            .await
            .unwrap();

        let descriptor = RequestDescriptor::builder("users")
            .lifetime(Duration::from_millis(40))
            .type_tag("User")
            .build()
            .unwrap();

        cache
            .get::<User, _, _>(&descriptor, || async { Ok(Some(ada())) })
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(120)).await;

        let reply = cache
            .get_detailed::<User, _, _>(&descriptor, || async { Err("down".into()) })
            .await
            .unwrap();

        assert_eq!(reply.payload, ada());
        assert_eq!(reply.source, Source::Memory);
    }

    #[tokio::test]
    async fn test_expired_record_evicted_when_fallback_disabled() {
        let dir = TempDir::new().unwrap();
        let cache = open_cache(&dir).await;

        let descriptor = RequestDescriptor::builder("users")
            .lifetime(Duration::from_millis(40))
            .type_tag("User")
            .build()
            .unwrap();

        cache
            .get::<User, _, _>(&descriptor, || async { Ok(Some(ada())) })
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(120)).await;

        let err = cache
            .get::<User, _, _>(&descriptor, || async { Err("down".into()) })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoDataFromLoader { .. }));

        // The stale record is gone: a fresh loader result replaces it
        let reply = cache
            .get_detailed::<User, _, _>(&descriptor, || async {
                Ok(Some(User { id: 9, name: "fresh".into() }))
            })
            .await
            .unwrap();
        assert_eq!(reply.source, Source::Cloud);
        assert_eq!(reply.payload.id, 9);
    }

    #[tokio::test]
    async fn test_eviction_directive_forces_loader() {
        let dir = TempDir::new().unwrap();
        let cache = open_cache(&dir).await;

        let plain = RequestDescriptor::builder("users")
            .dynamic_key("v1")
            .type_tag("User")
            .build()
            .unwrap();
        cache
            .get::<User, _, _>(&plain, || async { Ok(Some(ada())) })
            .await
            .unwrap();

        let evicting = RequestDescriptor::builder("users")
            .dynamic_key("v1")
            .evict(EvictionDirective::DynamicKey)
            .type_tag("User")
            .build()
            .unwrap();

        let reply = cache
            .get_detailed::<User, _, _>(&evicting, || async {
                Ok(Some(User { id: 2, name: "new".into() }))
            })
            .await
            .unwrap();

        // The hit was ignored and the loader re-fetched
        assert_eq!(reply.source, Source::Cloud);
        assert_eq!(reply.payload.id, 2);
    }

    #[tokio::test]
    async fn test_eviction_directive_fires_on_loader_failure() {
        let dir = TempDir::new().unwrap();
        let cache = open_cache(&dir).await;

        let plain = RequestDescriptor::builder("users")
            .dynamic_key("v1")
            .type_tag("User")
            .build()
            .unwrap();
        cache
            .get::<User, _, _>(&plain, || async { Ok(Some(ada())) })
            .await
            .unwrap();

        let evicting = RequestDescriptor::builder("users")
            .dynamic_key("v1")
            .evict(EvictionDirective::DynamicKey)
            .type_tag("User")
            .build()
            .unwrap();

        let err = cache
            .get::<User, _, _>(&evicting, || async { Err("down".into()) })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoDataFromLoader { .. }));

        // Even though the loader failed, the scope was cleared
        let err = cache
            .get::<User, _, _>(&plain, || async { Ok(None) })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoDataFromLoader { .. }));
    }

    #[tokio::test]
    async fn test_response_shaping_follows_descriptor() {
        let dir = TempDir::new().unwrap();
        let cache = open_cache(&dir).await;

        let bare = users_descriptor();
        let response = cache
            .request::<User, _, _>(&bare, || async { Ok(Some(ada())) })
            .await
            .unwrap();
        assert!(matches!(response, Response::Payload(_)));

        let detailed = RequestDescriptor::builder("users")
            .detailed_response(true)
            .type_tag("User")
            .build()
            .unwrap();
        let response = cache
            .request::<User, _, _>(&detailed, || async { Ok(Some(ada())) })
            .await
            .unwrap();
        assert_eq!(response.source(), Some(Source::Memory));
    }

    #[tokio::test]
    async fn test_returned_payload_is_isolated_from_cache() {
        let dir = TempDir::new().unwrap();
        let cache = open_cache(&dir).await;
        let descriptor = users_descriptor();

        let mut first: User = cache
            .get(&descriptor, || async { Ok(Some(ada())) })
            .await
            .unwrap();
        first.name = "mutated".into();

        let second: User = cache
            .get(&descriptor, || async { Ok(Some(ada())) })
            .await
            .unwrap();
        assert_eq!(second, ada());
    }

    #[tokio::test]
    async fn test_separator_collision_rejected() {
        let dir = TempDir::new().unwrap();
        let cache = open_cache(&dir).await;

        let descriptor = RequestDescriptor::builder("users")
            .dynamic_key("v$d$1")
            .build()
            .unwrap();

        let err = cache
            .get::<User, _, _>(&descriptor, || async { Ok(Some(ada())) })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::KeySeparatorCollision(_)));
    }

    #[tokio::test]
    async fn test_escaped_keys_accepted_when_enabled() {
        let dir = TempDir::new().unwrap();
        let cache = Strata::builder()
            .escape_keys(true)
            .persistence(dir.path())
            .await
            .unwrap();

        let descriptor = RequestDescriptor::builder("users")
            .dynamic_key("v$d$1")
            .type_tag("User")
            .build()
            .unwrap();

        cache
            .get::<User, _, _>(&descriptor, || async { Ok(Some(ada())) })
            .await
            .unwrap();

        // Same escaped key hits the cached record
        let reply = cache
            .get_detailed::<User, _, _>(&descriptor, || async { Ok(None) })
            .await
            .unwrap();
        assert_eq!(reply.source, Source::Memory);
    }

    #[tokio::test]
    async fn test_explicit_evictions() {
        let dir = TempDir::new().unwrap();
        let cache = open_cache(&dir).await;
        let descriptor = users_descriptor();

        cache
            .get::<User, _, _>(&descriptor, || async { Ok(Some(ada())) })
            .await
            .unwrap();
        cache.evict_provider("users").await.unwrap();

        let err = cache
            .get::<User, _, _>(&descriptor, || async { Ok(None) })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoDataFromLoader { .. }));
    }

    #[tokio::test]
    async fn test_metrics_track_pipeline_activity() {
        let dir = TempDir::new().unwrap();
        let cache = open_cache(&dir).await;
        let descriptor = users_descriptor();

        cache
            .get::<User, _, _>(&descriptor, || async { Ok(Some(ada())) })
            .await
            .unwrap();
        cache
            .get::<User, _, _>(&descriptor, || async { Ok(None) })
            .await
            .unwrap();

        let snapshot = cache.metrics();
        assert_eq!(snapshot.loader_calls, 1);
        assert_eq!(snapshot.memory_hits, 1);
    }
}
