//! Composite Cache Keys
//!
//! Every cache entry is addressed by a `(provider, dynamic?, group?)` triple.
//! The triple flattens to a canonical string used by both layers; eviction
//! scopes are prefixes of that string.
//!
//! # Canonical form
//!
//! Separators appear only when the segment is present, so an empty segment
//! stays distinguishable from an absent one:
//!
//! ```text
//! ("users", None, None)            -> users
//! ("users", Some("v1"), None)      -> users$d$v1
//! ("users", Some("v1"), Some("g")) -> users$d$v1$g$g
//! ("users", Some(""), None)        -> users$d$
//! ```

use crate::error::{Error, Result};

/// Separator between the provider key and the dynamic key
pub const DYNAMIC_SEPARATOR: &str = "$d$";

/// Separator between the dynamic key and the group key
pub const GROUP_SEPARATOR: &str = "$g$";

/// Fully resolved cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompositeKey {
    provider: String,
    dynamic: Option<String>,
    group: Option<String>,
}

impl CompositeKey {
    /// Build a key from already validated segments.
    pub fn new(
        provider: impl Into<String>,
        dynamic: Option<String>,
        group: Option<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            dynamic,
            group,
        }
    }

    /// Build a key from user-supplied segments.
    ///
    /// With `escape` disabled, segments containing a reserved separator are
    /// rejected. With `escape` enabled, `$` and `%` are percent-escaped so no
    /// segment can collide with a separator.
    pub fn checked(
        provider: &str,
        dynamic: Option<&str>,
        group: Option<&str>,
        escape: bool,
    ) -> Result<Self> {
        if provider.is_empty() {
            return Err(Error::InvalidConfig("provider_key".into()));
        }
        if group.is_some() && dynamic.is_none() {
            return Err(Error::InvalidConfig(
                "group_key requires dynamic_key".into(),
            ));
        }

        let prepare = |segment: &str| -> Result<String> {
            if escape {
                Ok(escape_segment(segment))
            } else {
                validate_segment(segment)?;
                Ok(segment.to_string())
            }
        };

        Ok(Self {
            provider: prepare(provider)?,
            dynamic: dynamic.map(|s| prepare(s)).transpose()?,
            group: group.map(|s| prepare(s)).transpose()?,
        })
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn dynamic(&self) -> Option<&str> {
        self.dynamic.as_deref()
    }

    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    /// Flatten to the canonical string form.
    pub fn canonical(&self) -> String {
        let mut out = self.provider.clone();
        if let Some(dynamic) = &self.dynamic {
            out.push_str(DYNAMIC_SEPARATOR);
            out.push_str(dynamic);
            if let Some(group) = &self.group {
                out.push_str(GROUP_SEPARATOR);
                out.push_str(group);
            }
        }
        out
    }
}

impl std::fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.canonical())
    }
}

/// Reject segments that would be ambiguous in the canonical form.
pub fn validate_segment(segment: &str) -> Result<()> {
    if segment.contains(DYNAMIC_SEPARATOR) || segment.contains(GROUP_SEPARATOR) {
        return Err(Error::KeySeparatorCollision(segment.to_string()));
    }
    Ok(())
}

/// Percent-escape `%` and `$` so a segment can never contain a separator.
pub fn escape_segment(segment: &str) -> String {
    segment.replace('%', "%25").replace('$', "%24")
}

// =============================================================================
// Scope prefixes
// =============================================================================

/// Canonical key of the bare-provider entry.
pub fn provider_exact(provider: &str) -> String {
    provider.to_string()
}

/// Prefix matching every entry of a provider that carries a dynamic key.
pub fn provider_prefix(provider: &str) -> String {
    format!("{provider}{DYNAMIC_SEPARATOR}")
}

/// Canonical key of a `(provider, dynamic)` entry without a group.
pub fn dynamic_exact(provider: &str, dynamic: &str) -> String {
    format!("{provider}{DYNAMIC_SEPARATOR}{dynamic}")
}

/// Prefix matching every grouped entry under `(provider, dynamic)`.
pub fn dynamic_prefix(provider: &str, dynamic: &str) -> String {
    format!("{provider}{DYNAMIC_SEPARATOR}{dynamic}{GROUP_SEPARATOR}")
}

/// Canonical key of a fully qualified `(provider, dynamic, group)` entry.
pub fn group_exact(provider: &str, dynamic: &str, group: &str) -> String {
    format!("{provider}{DYNAMIC_SEPARATOR}{dynamic}{GROUP_SEPARATOR}{group}")
}

// =============================================================================
// File names
// =============================================================================

/// Encode a canonical key as a filesystem-safe file name.
///
/// Every byte outside `[A-Za-z0-9_-]` is percent-encoded, so the mapping is
/// bijective and never produces a `.` (the schema-version sidecar and tmp
/// files both contain one, so they can never collide with a key file).
pub fn file_name_for(canonical: &str) -> String {
    let mut out = String::with_capacity(canonical.len());
    for byte in canonical.bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_' | b'-' => out.push(byte as char),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

/// Decode a file name back to its canonical key.
///
/// Returns `None` for names that were not produced by [`file_name_for`].
pub fn canonical_from_file_name(name: &str) -> Option<String> {
    let bytes = name.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                let hex = bytes.get(i + 1..i + 3)?;
                let value = u8::from_str_radix(std::str::from_utf8(hex).ok()?, 16).ok()?;
                out.push(value);
                i += 3;
            }
            b @ (b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_' | b'-') => {
                out.push(b);
                i += 1;
            }
            _ => return None,
        }
    }
    String::from_utf8(out).ok()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_provider_only() {
        let key = CompositeKey::new("users", None, None);
        assert_eq!(key.canonical(), "users");
    }

    #[test]
    fn test_canonical_with_dynamic() {
        let key = CompositeKey::new("users", Some("v1".into()), None);
        assert_eq!(key.canonical(), "users$d$v1");
    }

    #[test]
    fn test_canonical_with_group() {
        let key = CompositeKey::new("users", Some("v1".into()), Some("page1".into()));
        assert_eq!(key.canonical(), "users$d$v1$g$page1");
    }

    #[test]
    fn test_empty_dynamic_distinct_from_absent() {
        let absent = CompositeKey::new("users", None, None);
        let empty = CompositeKey::new("users", Some(String::new()), None);
        assert_ne!(absent.canonical(), empty.canonical());
        assert_eq!(empty.canonical(), "users$d$");
    }

    #[test]
    fn test_checked_rejects_separator() {
        let err = CompositeKey::checked("users$d$evil", None, None, false).unwrap_err();
        assert!(matches!(err, Error::KeySeparatorCollision(_)));

        let err = CompositeKey::checked("users", Some("a$g$b"), None, false).unwrap_err();
        assert!(matches!(err, Error::KeySeparatorCollision(_)));
    }

    #[test]
    fn test_checked_rejects_empty_provider() {
        let err = CompositeKey::checked("", None, None, false).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_checked_rejects_group_without_dynamic() {
        let err = CompositeKey::checked("users", None, Some("g1"), false).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_checked_escapes_separator() {
        let key = CompositeKey::checked("users$d$x", None, None, true).unwrap();
        assert_eq!(key.canonical(), "users%24d%24x");

        // Escaped form no longer contains a separator
        validate_segment(key.provider()).unwrap();
    }

    #[test]
    fn test_escape_is_injective_for_percent() {
        // "%24" as literal input must not collide with an escaped "$"
        assert_ne!(escape_segment("%24"), escape_segment("$"));
    }

    #[test]
    fn test_scope_prefixes_have_no_false_positives() {
        // "users" scope must not capture "users2"
        assert!(!"users2$d$v1".starts_with(&provider_prefix("users")));
        assert_ne!("users2", provider_exact("users"));

        // "v1" scope must not capture "v10"
        assert!(!"users$d$v10".starts_with(&dynamic_prefix("users", "v1")));
        assert_ne!("users$d$v10", dynamic_exact("users", "v1"));
    }

    #[test]
    fn test_scope_prefixes_match_their_scope() {
        assert!("users$d$v1".starts_with(&provider_prefix("users")));
        assert!("users$d$v1$g$g1".starts_with(&dynamic_prefix("users", "v1")));
        assert_eq!("users$d$v1$g$g1", group_exact("users", "v1", "g1"));
    }

    #[test]
    fn test_file_name_round_trip() {
        for canonical in [
            "users",
            "users$d$v1$g$page 1",
            "files$d$/etc/passwd",
            "übersicht$d$müller",
            "a%b$d$c",
        ] {
            let name = file_name_for(canonical);
            assert!(!name.contains('$'));
            assert!(!name.contains('/'));
            assert!(!name.contains('.'));
            assert_eq!(canonical_from_file_name(&name).as_deref(), Some(canonical));
        }
    }

    #[test]
    fn test_file_name_rejects_foreign_names() {
        assert_eq!(canonical_from_file_name("version.marker"), None);
        assert_eq!(canonical_from_file_name("users%2"), None);
        assert_eq!(canonical_from_file_name("users%ZZ"), None);
        assert_eq!(canonical_from_file_name("stray.tmp"), None);
    }
}
