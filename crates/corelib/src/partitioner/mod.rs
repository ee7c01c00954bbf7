//! Key hashing for topology lookups.
//!
//! The hash used to place a key is dictated by the cluster, not chosen by the
//! client: a partitioned bucket names its algorithm in the configuration
//! document and every client must produce the server's result bit for bit.
//! Algorithms are therefore looked up by name through [`lookup`], and
//! applications that speak to a differently configured cluster can plug in
//! their own [`KeyHasher`].

pub mod crc;
pub mod ketama;
pub mod traits;

use std::sync::Arc;

pub use crc::Crc32Hasher;
pub use ketama::KetamaHasher;
pub use traits::KeyHasher;

/// Resolve a hash algorithm by the name the cluster advertises.
///
/// Names are matched case-insensitively. Unknown names yield `None`; callers
/// must treat that as a configuration error rather than fall back to some
/// other hash.
pub fn lookup(name: &str) -> Option<Arc<dyn KeyHasher>> {
    match name.to_ascii_uppercase().as_str() {
        "CRC" | "CRC32" => Some(Arc::new(Crc32Hasher)),
        "KETAMA" | "MD5" => Some(Arc::new(KetamaHasher)),
        _ => None,
    }
}
