//! Content hashing for sync versions and conflict detection.

use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 over the canonical JSON encoding of `fields`.
///
/// `serde_json::Map` iterates keys in sorted order (the `preserve_order`
/// feature is not enabled), so equal maps always serialize identically.
#[must_use]
pub fn version_hash(fields: &serde_json::Map<String, serde_json::Value>) -> String {
    let canonical = serde_json::Value::Object(fields.clone()).to_string();
    let digest = Sha256::digest(canonical.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}
