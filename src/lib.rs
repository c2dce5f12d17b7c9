//! Strata - Reactive Two-Tier Provider Cache
//!
//! A keyed cache for application-defined "providers": async functions that
//! fetch remote or expensive data. Each request either returns a previously
//! stored record (memory first, then disk) or delegates to the loader,
//! stores the result, and returns it.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                            Strata                                │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  Request Pipeline                                                │
//! │  (startup gate → lookup → loader fallback → deep copy)          │
//! │        │                                                         │
//! │        ▼                                                         │
//! │  Two-Tier Cache ───────▶ Memory Layer (DashMap)                  │
//! │  (TTL, scopes,  ───────▶ Persistence (file per key + codec)      │
//! │   disk budget)                                                   │
//! │                                                                  │
//! │  Startup: Migration Runner → Expired-Record Sweeper → ready     │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Features
//!
//! - Per-record time-to-live (`0` = immortal)
//! - Eviction by provider, dynamic-key, or dynamic-key-group scope
//! - Disk-size budget with deterministic reclamation of expirable records
//! - Ordered schema migrations applied before any request completes
//! - Optional serve-expired-data policy when the loader fails
//! - Deep-copy isolation: callers never share mutable state with the cache
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use strata::{RequestDescriptor, Strata};
//!
//! #[derive(serde::Serialize, serde::Deserialize)]
//! struct User { id: u64, name: String }
//!
//! # async fn run() -> strata::Result<()> {
//! let cache = Strata::builder()
//!     .use_expired_data_if_loader_not_available(true)
//!     .max_mb_persistence_cache(50)
//!     .persistence("/var/cache/myapp")
//!     .await?;
//!
//! let descriptor = RequestDescriptor::builder("users")
//!     .dynamic_key("page-1")
//!     .lifetime(Duration::from_secs(300))
//!     .type_tag("User")
//!     .build()?;
//!
//! let users: Vec<User> = cache
//!     .get(&descriptor, || async {
//!         // fetch from the network; `None` means "no data"
//!         Ok(Some(vec![User { id: 1, name: "ada".into() }]))
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`cache`] - Two-tier memory+disk coordination
//! - [`codec`] - Pluggable on-disk record codec
//! - [`config`] - Builder and configuration
//! - [`copy`] - Deep-copy isolation
//! - [`descriptor`] - Request descriptors and eviction directives
//! - [`error`] - Error types
//! - [`key`] - Composite keys and canonical flattening
//! - [`memory`] - In-process record map
//! - [`metrics`] - In-process counters
//! - [`migration`] - Startup schema migrations
//! - [`persistence`] - File-per-key disk store
//! - [`pipeline`] - The request pipeline and cache handle
//! - [`record`] - Records, replies, and payload sources
//! - [`startup`] - Startup gating
//! - [`sweeper`] - Expired-record sweep

pub mod cache;
pub mod codec;
pub mod config;
pub mod copy;
pub mod descriptor;
pub mod error;
pub mod key;
pub mod memory;
pub mod metrics;
pub mod migration;
pub mod persistence;
pub mod pipeline;
pub mod record;
pub mod startup;
pub mod sweeper;

// Re-export the public surface
pub use codec::{JsonCodec, RecordCodec};
pub use config::{CacheConfig, StrataBuilder, DEFAULT_MAX_MB};
pub use descriptor::{EvictionDirective, RequestDescriptor, RequestDescriptorBuilder};
pub use error::{Error, LoaderError, Result};
pub use key::CompositeKey;
pub use metrics::MetricsSnapshot;
pub use migration::{Migration, MigrationAction};
pub use pipeline::Strata;
pub use record::{Record, Reply, Response, Source};
