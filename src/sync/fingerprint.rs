//! Content fingerprinting for change detection.
//!
//! A fingerprint is a SHA256 hash of the canonicalized parsed content. Two
//! machines that parse identical source bytes must produce identical
//! fingerprints, so the input is serialized through serde_json with
//! `BTreeMap`-ordered keys before hashing.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Stable sentinel for empty/absent content.
///
/// Distinct from any real digest: real fingerprints are 64 lowercase hex
/// characters.
pub const EMPTY_FINGERPRINT: &str = "empty";

/// Compute a SHA256 fingerprint of a serializable value.
///
/// # Panics
///
/// Panics if the value cannot be serialized to JSON. This should never
/// happen for our data types, which are all serializable.
#[must_use]
pub fn fingerprint<T: Serialize>(value: &T) -> String {
    let json = serde_json::to_string(value).expect("serialization should not fail");
    fingerprint_str(&json)
}

/// Compute a SHA256 fingerprint of raw content.
///
/// Empty content maps to [`EMPTY_FINGERPRINT`] rather than the hash of the
/// empty string, so "nothing parsed" can never collide with real content.
#[must_use]
pub fn fingerprint_str(content: &str) -> String {
    if content.is_empty() {
        return EMPTY_FINGERPRINT.to_string();
    }
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_fingerprint_deterministic() {
        let mut record = BTreeMap::new();
        record.insert("title", "Morning pages");
        record.insert("status", "draft");

        let a = fingerprint(&record);
        let b = fingerprint(&record);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_fingerprint_changes_with_content() {
        let mut record = BTreeMap::new();
        record.insert("title", "Morning pages");
        let a = fingerprint(&record);

        record.insert("title", "Evening pages");
        let b = fingerprint(&record);
        assert_ne!(a, b);
    }

    #[test]
    fn test_empty_content_maps_to_sentinel() {
        assert_eq!(fingerprint_str(""), EMPTY_FINGERPRINT);
        assert_ne!(fingerprint_str("x"), EMPTY_FINGERPRINT);
    }

    #[test]
    fn test_sentinel_distinct_from_hash_of_empty() {
        let mut hasher = Sha256::new();
        hasher.update(b"");
        let hash_of_empty = format!("{:x}", hasher.finalize());
        assert_ne!(fingerprint_str(""), hash_of_empty);
    }
}
