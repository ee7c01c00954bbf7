//! CRC32 key hash used for partition (vbucket) selection.

use crate::partitioner::traits::KeyHasher;

/// The cluster's partition hash: the upper half of the CRC32 digest, masked
/// to 15 bits. The partition index is this value masked by
/// `partition_count - 1`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Crc32Hasher;

impl KeyHasher for Crc32Hasher {
    fn hash(&self, key: &[u8]) -> u32 {
        (crc32fast::hash(key) >> 16) & 0x7fff
    }

    fn name(&self) -> &'static str {
        "CRC"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_value() {
        // crc32("123456789") == 0xCBF43926
        assert_eq!(Crc32Hasher.hash(b"123456789"), 0x4bf4);
    }

    #[test]
    fn test_stays_within_fifteen_bits() {
        for key in ["a", "user::1", "", "a much longer key with spaces"] {
            assert!(Crc32Hasher.hash(key.as_bytes()) <= 0x7fff);
        }
    }
}
