//! Content hashing and URL-safe base64 encoding.
//!
//! Block ids and style hashes are persisted on disk and referenced from
//! streams, so both the hash function (xxHash, seed 0) and the encoding
//! (base64 with the `-_` alphabet, no padding, little-endian integers) are
//! bit-exact contracts.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use xxhash_rust::xxh32::xxh32;
use xxhash_rust::xxh64::xxh64;

/// URL-safe base64 without padding.
pub fn encode_url64(input: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(input)
}

/// Stable 32-bit content hash (xxHash32, seed 0).
pub fn hash32(input: &[u8]) -> u32 {
    xxh32(input, 0)
}

/// Stable 64-bit content hash (xxHash64, seed 0).
pub fn hash64(input: &[u8]) -> u64 {
    xxh64(input, 0)
}

/// 32-bit hash of `input`, base64-url encoded from its little-endian bytes.
pub fn hash32_url64(input: &[u8]) -> String {
    encode_url64(&hash32(input).to_le_bytes())
}

/// 64-bit hash of `input`, base64-url encoded from its little-endian bytes.
pub fn hash64_url64(input: &[u8]) -> String {
    encode_url64(&hash64(input).to_le_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url64_alphabet() {
        // 0xfb 0xff maps onto the -_ tail of the alphabet, without padding.
        assert_eq!(encode_url64(&[0xfb, 0xef]), "--8");
        assert_eq!(encode_url64(b""), "");
        assert_eq!(encode_url64(b"f"), "Zg");
        assert_eq!(encode_url64(b"fo"), "Zm8");
        assert_eq!(encode_url64(b"foo"), "Zm9v");
    }

    #[test]
    fn hashes_are_stable() {
        // Reference digests for xxHash with seed 0.
        assert_eq!(hash32(b""), 0x02cc5d05);
        assert_eq!(hash64(b""), 0xef46db3751d8e999);
        assert_eq!(hash32(b"xxhash"), xxh32(b"xxhash", 0));
        // Same input, same id, every run.
        assert_eq!(hash32_url64(b"Hello"), hash32_url64(b"Hello"));
        assert_ne!(hash32_url64(b"Hello"), hash32_url64(b"hello"));
    }

    #[test]
    fn integer_encoding_is_little_endian() {
        let h = 0x0403_0201u32;
        assert_eq!(encode_url64(&h.to_le_bytes()), encode_url64(&[1, 2, 3, 4]));
    }
}
