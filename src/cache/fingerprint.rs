//! Request fingerprinting
//!
//! Cache keys are SHA-256 digests over a canonical serialization of the
//! request inputs. Inputs go through a `BTreeMap`, so the digest depends
//! only on keys and values, never on the order the caller assembled them.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Fingerprint a set of named inputs into a lowercase hex digest
pub fn fingerprint(kind: &str, inputs: &BTreeMap<&str, String>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(kind.as_bytes());
    hasher.update(b"\x00");
    for (key, value) in inputs {
        hasher.update(key.as_bytes());
        hasher.update(b"\x1f");
        hasher.update(value.as_bytes());
        hasher.update(b"\x1e");
    }
    hex::encode(hasher.finalize())
}

/// Fingerprint for a generated test: covers the node set (sorted, so the
/// caller's ordering is irrelevant) and the difficulty stage
pub fn test_fingerprint(node_ids: &[String], difficulty: &str) -> String {
    let mut sorted = node_ids.to_vec();
    sorted.sort();

    let mut inputs = BTreeMap::new();
    inputs.insert("nodes", sorted.join(","));
    inputs.insert("difficulty", difficulty.to_string());
    fingerprint("test", &inputs)
}

/// Fingerprint for a project review: identical content against the same
/// node and submission type hits the same entry
pub fn review_fingerprint(node_id: &str, content: &str, submission_type: &str) -> String {
    let mut inputs = BTreeMap::new();
    inputs.insert("node", node_id.to_string());
    inputs.insert("content", content.to_string());
    inputs.insert("type", submission_type.to_string());
    fingerprint("review", &inputs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic() {
        let mut a = BTreeMap::new();
        a.insert("x", "1".to_string());
        a.insert("y", "2".to_string());
        assert_eq!(fingerprint("test", &a), fingerprint("test", &a));
    }

    #[test]
    fn test_order_independent() {
        // Same node set in different orders yields the same digest
        let forward = test_fingerprint(&["a".into(), "b".into(), "c".into()], "basic");
        let reverse = test_fingerprint(&["c".into(), "b".into(), "a".into()], "basic");
        assert_eq!(forward, reverse);
    }

    #[test]
    fn test_input_sensitive() {
        let base = test_fingerprint(&["a".into(), "b".into()], "basic");
        assert_ne!(base, test_fingerprint(&["a".into(), "b".into()], "mastery"));
        assert_ne!(base, test_fingerprint(&["a".into()], "basic"));
    }

    #[test]
    fn test_kind_namespaces_digest() {
        let mut inputs = BTreeMap::new();
        inputs.insert("x", "1".to_string());
        assert_ne!(fingerprint("test", &inputs), fingerprint("review", &inputs));
    }

    #[test]
    fn test_review_content_sensitive() {
        let a = review_fingerprint("n1", "fn main() {}", "code");
        let b = review_fingerprint("n1", "fn main() { }", "code");
        assert_ne!(a, b);
        assert_ne!(a, review_fingerprint("n1", "fn main() {}", "github"));
    }

    #[test]
    fn test_hex_shape() {
        let digest = review_fingerprint("n1", "content", "code");
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}
