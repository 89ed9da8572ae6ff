//! Canonical content hashing.
//!
//! Every content-addressed artifact in the pipeline (bars snapshot, signal
//! frame schema fingerprint, intent stream, fills stream) is hashed the same
//! way: serialize to a stable byte representation, then SHA-256 and encode
//! as lowercase hex. Stable serialization is the caller's job — this module
//! only owns the hash primitive, matching the teacher's `RawPayload::hash`
//! pattern of `Sha256::new()` → `update()` → `format!("{:x}", ...)`.

use sha2::{Digest, Sha256};

/// SHA-256 of `bytes`, lowercase hex encoded.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Well-defined hash of an empty canonical stream (used for empty intent
/// and empty fills frames — spec §4.7, §4.6: "empty signal-active rows →
/// empty intent frame with a well-defined hash").
pub fn empty_stream_hash() -> String {
    sha256_hex(b"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_hex_is_64_chars() {
        assert_eq!(sha256_hex(b"hello").len(), 64);
    }

    #[test]
    fn sha256_hex_is_deterministic() {
        assert_eq!(sha256_hex(b"hello"), sha256_hex(b"hello"));
    }

    #[test]
    fn different_input_different_hash() {
        assert_ne!(sha256_hex(b"hello"), sha256_hex(b"world"));
    }

    #[test]
    fn empty_stream_hash_is_stable() {
        assert_eq!(empty_stream_hash(), sha256_hex(b""));
    }
}
