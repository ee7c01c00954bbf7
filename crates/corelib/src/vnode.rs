//! Virtual node abstractions.
//!
//! # Virtual Nodes (VNodes) Concept
//!
//! Unpartitioned buckets have no partition map; keys are spread over the
//! servers with a consistent-hash ring instead. Each physical node owns many
//! points on that ring (virtual nodes). This provides:
//!
//! 1. **Even Load**: more points per node smooth out the key distribution
//! 2. **Minimal Movement**: removing a node only remaps the keys that node owned
//! 3. **Agreement**: every client derives the same points from the node list,
//!    so all of them route a key to the same server
//!
//! # Point Derivation
//!
//! Points follow the ketama scheme: for a node with data address `host:port`
//! and digest index `i`, hash the string `"host:port-i"` with MD5 and cut the
//! 16-byte digest into four little-endian `u32` points. A node with weight
//! `w` therefore uses `w / 4` digests.
//!
//! # Performance Characteristics
//!
//! - **Memory**: O(w) per node
//! - **Lookup**: O(log n) where n = total points on the ring

use crate::partitioner::KetamaHasher;

/// Points each node places on the ring. Fixed by the protocol so that every
/// client builds an identical ring.
pub const DEFAULT_WEIGHT: usize = 160;

/// A virtual node on the hash ring.
///
/// # Invariants
///
/// - Every `VirtualNode` belongs to exactly one physical node (by index into
///   the snapshot's node list)
/// - Ordering is by token first, so a sorted slice is a walk around the ring
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VirtualNode {
    /// Position on the ring.
    pub token: u32,

    /// Index of the owning node in the configuration's node list.
    ///
    /// Many virtual nodes share the same index; a lookup finds the vnode
    /// first and then routes to this node.
    pub node: usize,
}

impl VirtualNode {
    /// Create a new virtual node.
    #[inline]
    pub fn new(token: u32, node: usize) -> Self {
        Self { token, node }
    }

    /// All points for one physical node.
    ///
    /// # Arguments
    /// * `node` - Index of the node in the configuration
    /// * `addr` - The node's data address (`host:port`)
    /// * `weight` - Number of points; rounded down to a multiple of four,
    ///   with a minimum of one digest
    ///
    /// # Example
    /// ```rust
    /// use corelib::vnode::VirtualNode;
    ///
    /// let points = VirtualNode::points_for(0, "10.0.0.1:11210", 160);
    /// assert_eq!(points.len(), 160);
    /// ```
    pub fn points_for(node: usize, addr: &str, weight: usize) -> Vec<VirtualNode> {
        let digests = (weight / 4).max(1);
        let mut points = Vec::with_capacity(digests * 4);
        for i in 0..digests {
            let digest = KetamaHasher::digest(format!("{addr}-{i}").as_bytes());
            for chunk in 0..4 {
                points.push(Self::new(KetamaHasher::point(&digest, chunk), node));
            }
        }
        points
    }

    /// Clockwise distance from this point to another.
    #[inline]
    pub fn distance_to(&self, other: &Self) -> u32 {
        other.token.wrapping_sub(self.token)
    }
}

impl std::fmt::Display for VirtualNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "VNode(token={:08x}, node={})", self.token, self.node)
    }
}
