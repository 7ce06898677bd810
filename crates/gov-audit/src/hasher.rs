// hasher.rs — SHA-256 helpers for chaining audit records.
//
// Hashes are lowercase hex (64 chars) so they embed cleanly in JSON.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::AuditError;

/// Hash arbitrary bytes, returning a lowercase hex-encoded SHA-256 string.
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Hash a UTF-8 string.
pub fn hash_str(s: &str) -> String {
    hash_bytes(s.as_bytes())
}

/// Hash the compact JSON encoding of a value.
///
/// Used to fingerprint trigger payloads in audit records without storing
/// the payload itself.
pub fn hash_json<T: Serialize>(value: &T) -> Result<String, AuditError> {
    let json = serde_json::to_vec(value)?;
    Ok(hash_bytes(&json))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_empty_digest() {
        assert_eq!(
            hash_str(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn hex_shape() {
        let hash = hash_str("trigger");
        assert_eq!(hash.len(), 64);
        assert!(hash
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_uppercase()));
    }

    #[test]
    fn json_hash_is_stable_for_equal_values() {
        let a = serde_json::json!({"to": "ops@example.com"});
        let b = serde_json::json!({"to": "ops@example.com"});
        assert_eq!(hash_json(&a).unwrap(), hash_json(&b).unwrap());
        assert_ne!(
            hash_json(&a).unwrap(),
            hash_json(&serde_json::json!({"to": "x"})).unwrap()
        );
    }
}
