//! Cache Records and Replies
//!
//! A [`Record`] is what the two layers store: the payload (as a
//! self-describing JSON value plus its type tag, kept for schema migrations)
//! and the expiry metadata. A [`Reply`] is what leaves the cache: the payload
//! together with its origin.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Origin of a payload returned to a caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Source {
    /// Served from the in-process map
    #[default]
    Memory,
    /// Served from the persistence layer
    Disk,
    /// Freshly produced by the loader
    Cloud,
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Source::Memory => write!(f, "MEMORY"),
            Source::Disk => write!(f, "DISK"),
            Source::Cloud => write!(f, "CLOUD"),
        }
    }
}

/// A stored payload plus its cache metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    /// Opaque payload value
    payload: Value,
    /// Structural type tag of the payload, used by schema migrations
    type_tag: String,
    /// Creation timestamp
    created_at: DateTime<Utc>,
    /// Configured lifetime in milliseconds (0 = never expires)
    lifetime_millis: u64,
    /// Whether the sweeper and budget reclamation may delete this record
    expirable: bool,
    /// Where this record instance came from. Runtime-only, never persisted.
    #[serde(skip)]
    source: Source,
}

impl Record {
    /// Create a record stamped with the current wall clock.
    pub fn new(
        payload: Value,
        type_tag: impl Into<String>,
        lifetime_millis: u64,
        expirable: bool,
    ) -> Self {
        Self {
            payload,
            type_tag: type_tag.into(),
            created_at: Utc::now(),
            lifetime_millis,
            expirable,
            source: Source::Memory,
        }
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn into_payload(self) -> Value {
        self.payload
    }

    pub fn type_tag(&self) -> &str {
        &self.type_tag
    }

    /// Rewrite the type tag. Used by schema migrations.
    pub fn set_type_tag(&mut self, type_tag: impl Into<String>) {
        self.type_tag = type_tag.into();
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn lifetime_millis(&self) -> u64 {
        self.lifetime_millis
    }

    pub fn expirable(&self) -> bool {
        self.expirable
    }

    pub fn source(&self) -> Source {
        self.source
    }

    /// Tag this record instance with the layer it was read from.
    pub fn with_source(mut self, source: Source) -> Self {
        self.source = source;
        self
    }

    /// Age of the record in milliseconds. Clock skew clamps to zero.
    fn age_millis(&self) -> u64 {
        (Utc::now() - self.created_at).num_milliseconds().max(0) as u64
    }

    /// Expiry check against a caller-supplied lifetime.
    ///
    /// A lifetime of 0 means the record never expires.
    pub fn is_expired(&self, lifetime_millis: u64) -> bool {
        lifetime_millis != 0 && self.age_millis() > lifetime_millis
    }

    /// Expiry check against the lifetime stored with the record.
    pub fn has_expired(&self) -> bool {
        self.is_expired(self.lifetime_millis)
    }

    /// Shift the creation timestamp into the past. Test helper.
    #[cfg(test)]
    pub(crate) fn backdate(&mut self, millis: u64) {
        self.created_at -= chrono::Duration::milliseconds(millis as i64);
    }
}

/// A payload plus its origin, returned for detailed responses
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply<T> {
    /// The deep-copied payload
    pub payload: T,
    /// Which layer produced it
    pub source: Source,
}

impl<T> Reply<T> {
    pub fn new(payload: T, source: Source) -> Self {
        Self { payload, source }
    }
}

/// Shaped pipeline output: bare payload or full reply, per the descriptor
#[derive(Debug, Clone)]
pub enum Response<T> {
    /// The descriptor did not request a detailed response
    Payload(T),
    /// The descriptor requested payload + source
    Detailed(Reply<T>),
}

impl<T> Response<T> {
    /// Unwrap to the payload, discarding the source if present.
    pub fn into_payload(self) -> T {
        match self {
            Response::Payload(payload) => payload,
            Response::Detailed(reply) => reply.payload,
        }
    }

    /// The origin, when the response is detailed.
    pub fn source(&self) -> Option<Source> {
        match self {
            Response::Payload(_) => None,
            Response::Detailed(reply) => Some(reply.source),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
