//! Deep-Copy Isolation
//!
//! Every payload handed to a caller is structurally independent from what the
//! cache holds, so a caller mutating a returned value can never poison later
//! reads. Copies are produced by a serialization round-trip.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{Error, Result};

/// Produces structurally independent copies of cached payloads
#[derive(Debug, Default, Clone, Copy)]
pub struct DeepCopier;

impl DeepCopier {
    pub fn new() -> Self {
        Self
    }

    /// Convert a caller payload into the stored value form.
    pub fn to_value<T: Serialize>(&self, payload: &T) -> Result<Value> {
        serde_json::to_value(payload).map_err(|e| Error::DeepCopy(e.to_string()))
    }

    /// Materialize an independent, typed copy of a stored value.
    pub fn materialize<T: DeserializeOwned>(&self, value: &Value) -> Result<T> {
        serde_json::from_value(value.clone()).map_err(|e| Error::DeepCopy(e.to_string()))
    }

    /// Clone a stored value through an encode/decode round-trip.
    pub fn copy_value(&self, value: &Value) -> Result<Value> {
        let bytes = serde_json::to_vec(value).map_err(|e| Error::DeepCopy(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| Error::DeepCopy(e.to_string()))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct User {
        id: u64,
        name: String,
        tags: Vec<String>,
    }

    fn make_user() -> User {
        User {
            id: 1,
            name: "ada".into(),
            tags: vec!["admin".into()],
        }
    }

    #[test]
    fn test_round_trip_preserves_structure() {
        let copier = DeepCopier::new();
        let value = copier.to_value(&make_user()).unwrap();
        let back: User = copier.materialize(&value).unwrap();
        assert_eq!(back, make_user());
    }

    #[test]
    fn test_materialized_copy_is_independent() {
        let copier = DeepCopier::new();
        let stored = copier.to_value(&make_user()).unwrap();

        let mut copy: User = copier.materialize(&stored).unwrap();
        copy.name = "mutated".into();
        copy.tags.push("extra".into());

        // The stored value is untouched by the caller's mutation
        let again: User = copier.materialize(&stored).unwrap();
        assert_eq!(again, make_user());
    }

    #[test]
    fn test_copy_value_is_independent() {
        let copier = DeepCopier::new();
        let original = json!({"nested": {"list": [1, 2, 3]}});

        let mut copy = copier.copy_value(&original).unwrap();
        copy["nested"]["list"][0] = json!(99);

        assert_eq!(original["nested"]["list"][0], json!(1));
    }

    #[test]
    fn test_materialize_type_mismatch_fails() {
        let copier = DeepCopier::new();
        let value = json!("just a string");
        let err = copier.materialize::<User>(&value).unwrap_err();
        assert!(matches!(err, Error::DeepCopy(_)));
    }
}
