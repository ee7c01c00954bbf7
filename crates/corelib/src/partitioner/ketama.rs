//! MD5 ("ketama") key hash used by the unpartitioned ring.

use md5::{Digest, Md5};

use crate::partitioner::traits::KeyHasher;

/// Ketama hash: the first four bytes of the MD5 digest, little-endian.
#[derive(Clone, Copy, Debug, Default)]
pub struct KetamaHasher;

impl KetamaHasher {
    /// Full 16-byte MD5 digest. Ring construction takes four points from each.
    pub fn digest(key: &[u8]) -> [u8; 16] {
        let mut out = [0u8; 16];
        out.copy_from_slice(&Md5::digest(key));
        out
    }

    /// The `chunk`-th little-endian u32 of a digest (`chunk` in `0..4`).
    pub fn point(digest: &[u8; 16], chunk: usize) -> u32 {
        let base = chunk * 4;
        u32::from_le_bytes([
            digest[base],
            digest[base + 1],
            digest[base + 2],
            digest[base + 3],
        ])
    }
}

impl KeyHasher for KetamaHasher {
    fn hash(&self, key: &[u8]) -> u32 {
        Self::point(&Self::digest(key), 0)
    }

    fn name(&self) -> &'static str {
        "KETAMA"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_key() {
        // md5("") = d41d8cd98f00b204e9800998ecf8427e
        assert_eq!(KetamaHasher.hash(b""), 0xd98c_1dd4);
    }

    #[test]
    fn test_point_chunks() {
        let digest = KetamaHasher::digest(b"");
        assert_eq!(KetamaHasher::point(&digest, 1), 0x04b2_008f);
        assert_eq!(KetamaHasher::point(&digest, 3), 0x7e42_f8ec);
    }
}
