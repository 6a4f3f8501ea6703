//! Fast hashing utilities using xxHash3.
//!
//! Every digest that is persisted or used to name a file goes through
//! [`digest_hex`], so fingerprints and asset names share one formula.

use xxhash_rust::xxh3::xxh3_128;

/// Compute a 128-bit hash of the given bytes using xxHash3.
#[inline]
pub fn hash_bytes(data: &[u8]) -> u128 {
    xxh3_128(data)
}

/// Convert a hash to a hex string (32 characters).
#[inline]
pub fn hash_to_hex(hash: u128) -> String {
    format!("{:032x}", hash)
}

/// Hash the given bytes and return the digest as lowercase hex.
#[inline]
pub fn digest_hex(data: &[u8]) -> String {
    hash_to_hex(hash_bytes(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_consistency() {
        let content = "Hello, World!";
        assert_eq!(hash_bytes(content.as_bytes()), hash_bytes(content.as_bytes()));
    }

    #[test]
    fn test_hash_difference() {
        assert_ne!(hash_bytes(b"Hello"), hash_bytes(b"World"));
    }

    #[test]
    fn test_hex_format() {
        let hex = hash_to_hex(hash_bytes(b"test"));
        assert_eq!(hex.len(), 32);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_digest_hex_is_lowercase() {
        let hex = digest_hex(b"pages/home.blade.php");
        assert_eq!(hex, hex.to_ascii_lowercase());
    }

    #[test]
    fn test_digest_hex_single_byte_sensitivity() {
        assert_ne!(digest_hex(b"h1{color:red}"), digest_hex(b"h1{color:red} "));
    }
}
