//! Core hasher trait definitions.

use std::fmt::Debug;

/// Maps a key to a 32-bit position.
///
/// Hashers are stateless and thread-safe, so a single instance is shared by
/// every snapshot that uses it.
pub trait KeyHasher: Send + Sync + Debug + 'static {
    /// Hash a key.
    ///
    /// # Arguments
    ///
    /// * `key` - The raw key bytes
    fn hash(&self, key: &[u8]) -> u32;

    /// Name of the algorithm as advertised by the cluster.
    fn name(&self) -> &'static str;
}
