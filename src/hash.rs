//! Content hashing for blocks

use blake3::Hasher;

/// A hash value represented as a hex string
pub type HashValue = String;

/// Sentinel parent hash of the first block in a chain.
///
/// Same width as a hex-encoded blake3 digest so pointer files are
/// uniform whether or not the chain is empty.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Number of hex characters in a block hash.
pub const HASH_LEN: usize = 64;

/// Compute the content hash of a block: parent hash plus the canonical
/// payload encoding, with a separator so the fields cannot bleed into
/// each other.
pub fn block_hash(parent: &str, payload_bytes: &[u8]) -> HashValue {
    let mut hasher = Hasher::new();
    hasher.update(parent.as_bytes());
    hasher.update(b"|");
    hasher.update(payload_bytes);
    hasher.finalize().to_hex().to_string()
}

/// Check whether a string looks like a block hash file name.
pub fn is_hash(name: &str) -> bool {
    name.len() == HASH_LEN && name.chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_hash_deterministic() {
        let h1 = block_hash("parent", b"payload");
        let h2 = block_hash("parent", b"payload");
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), HASH_LEN);
    }

    #[test]
    fn test_block_hash_depends_on_both_fields() {
        let base = block_hash("parent", b"payload");
        assert_ne!(base, block_hash("other", b"payload"));
        assert_ne!(base, block_hash("parent", b"other"));
    }

    #[test]
    fn test_genesis_sentinel_shape() {
        assert!(is_hash(GENESIS_HASH));
        assert!(!is_hash("abc"));
        assert!(!is_hash(&"g".repeat(HASH_LEN)));
    }
}
