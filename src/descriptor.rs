//! Request Descriptors
//!
//! A descriptor carries everything one provider invocation asks of the
//! cache: the composite key, the record lifetime, whether the record may be
//! swept, which scope (if any) to evict, and the response shape. The loader
//! itself travels alongside the descriptor at call time.

use std::time::Duration;

use crate::error::{Error, Result};
use crate::key::CompositeKey;

/// Which key scope, if any, a request clears
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvictionDirective {
    /// No scope is cleared
    #[default]
    None,
    /// Clear both layers entirely
    All,
    /// Clear every record of the provider
    Provider,
    /// Clear every record under `(provider, dynamic)`
    DynamicKey,
    /// Clear the single `(provider, dynamic, group)` record
    DynamicKeyGroup,
}

impl EvictionDirective {
    /// Whether this directive demands any eviction at all.
    pub fn evicts(&self) -> bool {
        !matches!(self, EvictionDirective::None)
    }
}

/// Cache-facing description of one provider invocation
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    provider_key: String,
    dynamic_key: Option<String>,
    group_key: Option<String>,
    lifetime_millis: u64,
    expirable: bool,
    detailed_response: bool,
    eviction: EvictionDirective,
    type_tag: Option<String>,
}

impl RequestDescriptor {
    /// Start building a descriptor for the named provider.
    pub fn builder(provider_key: impl Into<String>) -> RequestDescriptorBuilder {
        RequestDescriptorBuilder {
            provider_key: provider_key.into(),
            dynamic_key: None,
            group_key: None,
            lifetime_millis: 0,
            expirable: true,
            detailed_response: false,
            eviction: EvictionDirective::None,
            type_tag: None,
        }
    }

    pub fn provider_key(&self) -> &str {
        &self.provider_key
    }

    pub fn dynamic_key(&self) -> Option<&str> {
        self.dynamic_key.as_deref()
    }

    pub fn group_key(&self) -> Option<&str> {
        self.group_key.as_deref()
    }

    pub fn lifetime_millis(&self) -> u64 {
        self.lifetime_millis
    }

    pub fn expirable(&self) -> bool {
        self.expirable
    }

    pub fn detailed_response(&self) -> bool {
        self.detailed_response
    }

    pub fn eviction(&self) -> EvictionDirective {
        self.eviction
    }

    pub fn type_tag(&self) -> Option<&str> {
        self.type_tag.as_deref()
    }

    /// Resolve the composite key, validating or escaping the segments.
    pub fn cache_key(&self, escape: bool) -> Result<CompositeKey> {
        CompositeKey::checked(
            &self.provider_key,
            self.dynamic_key.as_deref(),
            self.group_key.as_deref(),
            escape,
        )
    }

}

/// Builder for [`RequestDescriptor`]
#[derive(Debug, Clone)]
pub struct RequestDescriptorBuilder {
    provider_key: String,
    dynamic_key: Option<String>,
    group_key: Option<String>,
    lifetime_millis: u64,
    expirable: bool,
    detailed_response: bool,
    eviction: EvictionDirective,
    type_tag: Option<String>,
}

impl RequestDescriptorBuilder {
    /// Address a sub-resource of the provider (e.g. a page or a filter).
    pub fn dynamic_key(mut self, dynamic_key: impl Into<String>) -> Self {
        self.dynamic_key = Some(dynamic_key.into());
        self
    }

    /// Address a group within the dynamic key.
    pub fn group_key(mut self, group_key: impl Into<String>) -> Self {
        self.group_key = Some(group_key.into());
        self
    }

    /// Record lifetime. Zero means the record never expires.
    pub fn lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime_millis = lifetime.as_millis() as u64;
        self
    }

    /// Explicitly immortal (the default).
    pub fn lifetime_forever(mut self) -> Self {
        self.lifetime_millis = 0;
        self
    }

    /// Whether the sweeper and budget reclamation may delete the record.
    pub fn expirable(mut self, expirable: bool) -> Self {
        self.expirable = expirable;
        self
    }

    /// Return a [`crate::Reply`] (payload + source) instead of the bare payload.
    pub fn detailed_response(mut self, detailed: bool) -> Self {
        self.detailed_response = detailed;
        self
    }

    /// Scope to clear when this request runs.
    pub fn evict(mut self, eviction: EvictionDirective) -> Self {
        self.eviction = eviction;
        self
    }

    /// Stable type tag for schema migrations. Defaults to the payload's
    /// `std::any::type_name` at save time.
    pub fn type_tag(mut self, type_tag: impl Into<String>) -> Self {
        self.type_tag = Some(type_tag.into());
        self
    }

    /// Validate and produce the descriptor.
    pub fn build(self) -> Result<RequestDescriptor> {
        if self.provider_key.is_empty() {
            return Err(Error::InvalidConfig("provider_key".into()));
        }
        if self.group_key.is_some() && self.dynamic_key.is_none() {
            return Err(Error::InvalidConfig(
                "group_key requires dynamic_key".into(),
            ));
        }
        match self.eviction {
            EvictionDirective::DynamicKey if self.dynamic_key.is_none() => {
                return Err(Error::InvalidConfig(
                    "EvictionDirective::DynamicKey requires dynamic_key".into(),
                ));
            }
            EvictionDirective::DynamicKeyGroup
                if self.dynamic_key.is_none() || self.group_key.is_none() =>
            {
                return Err(Error::InvalidConfig(
                    "EvictionDirective::DynamicKeyGroup requires dynamic_key and group_key".into(),
                ));
            }
            _ => {}
        }

        Ok(RequestDescriptor {
            provider_key: self.provider_key,
            dynamic_key: self.dynamic_key,
            group_key: self.group_key,
            lifetime_millis: self.lifetime_millis,
            expirable: self.expirable,
            detailed_response: self.detailed_response,
            eviction: self.eviction,
            type_tag: self.type_tag,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let descriptor = RequestDescriptor::builder("users").build().unwrap();

        assert_eq!(descriptor.provider_key(), "users");
        assert_eq!(descriptor.dynamic_key(), None);
        assert_eq!(descriptor.group_key(), None);
        assert_eq!(descriptor.lifetime_millis(), 0);
        assert!(descriptor.expirable());
        assert!(!descriptor.detailed_response());
        assert_eq!(descriptor.eviction(), EvictionDirective::None);
        assert_eq!(descriptor.type_tag(), None);
    }

    #[test]
    fn test_full_builder() {
        let descriptor = RequestDescriptor::builder("users")
            .dynamic_key("v1")
            .group_key("page1")
            .lifetime(Duration::from_secs(60))
            .expirable(false)
            .detailed_response(true)
            .evict(EvictionDirective::DynamicKeyGroup)
            .type_tag("User")
            .build()
            .unwrap();

        assert_eq!(descriptor.lifetime_millis(), 60_000);
        assert!(!descriptor.expirable());
        assert!(descriptor.detailed_response());
        assert_eq!(descriptor.eviction(), EvictionDirective::DynamicKeyGroup);
        assert_eq!(descriptor.type_tag(), Some("User"));
        assert_eq!(
            descriptor.cache_key(false).unwrap().canonical(),
            "users$d$v1$g$page1"
        );
    }

    #[test]
    fn test_empty_provider_rejected() {
        let err = RequestDescriptor::builder("").build().unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_group_without_dynamic_rejected() {
        let err = RequestDescriptor::builder("users")
            .group_key("g1")
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_directive_needs_matching_keys() {
        let err = RequestDescriptor::builder("users")
            .evict(EvictionDirective::DynamicKey)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));

        let err = RequestDescriptor::builder("users")
            .dynamic_key("v1")
            .evict(EvictionDirective::DynamicKeyGroup)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_directive_evicts() {
        assert!(!EvictionDirective::None.evicts());
        assert!(EvictionDirective::All.evicts());
        assert!(EvictionDirective::Provider.evicts());
        assert!(EvictionDirective::DynamicKey.evicts());
        assert!(EvictionDirective::DynamicKeyGroup.evicts());
    }

    #[test]
    fn test_separator_in_key_rejected_without_escaping() {
        let descriptor = RequestDescriptor::builder("users")
            .dynamic_key("v$g$1")
            .build()
            .unwrap();

        assert!(descriptor.cache_key(false).is_err());
        assert!(descriptor.cache_key(true).is_ok());
    }
}
