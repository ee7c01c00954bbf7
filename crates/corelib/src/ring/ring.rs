//! Hash ring data structure.

use std::collections::BTreeMap;

use crate::partitioner::{KetamaHasher, KeyHasher};
use crate::vnode::{VirtualNode, DEFAULT_WEIGHT};

/// Immutable ketama ring over node indices.
#[derive(Debug, Clone, Default)]
pub struct HashRing {
    /// Sorted by token, one entry per distinct token.
    points: Vec<VirtualNode>,
    nodes: usize,
}

impl HashRing {
    /// Node index owning `key`, or `None` on an empty ring.
    ///
    /// The owner is the first point at or after the key's hash, wrapping to
    /// the smallest point past the end of the ring.
    pub fn lookup(&self, key: &[u8]) -> Option<usize> {
        self.lookup_hash(KetamaHasher.hash(key))
    }

    /// Same as [`lookup`](Self::lookup) for an already computed hash.
    pub fn lookup_hash(&self, hash: u32) -> Option<usize> {
        if self.points.is_empty() {
            return None;
        }
        let idx = self.points.partition_point(|p| p.token < hash);
        let point = self.points.get(idx).unwrap_or(&self.points[0]);
        Some(point.node)
    }

    pub fn node_count(&self) -> usize {
        self.nodes
    }

    pub fn token_count(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// All points in ring order (for debugging).
    pub fn points(&self) -> &[VirtualNode] {
        &self.points
    }
}

/// Builds a [`HashRing`] from node data addresses.
#[derive(Debug)]
pub struct RingBuilder {
    weight: usize,
    nodes: Vec<(usize, String)>,
}

impl RingBuilder {
    pub fn new() -> Self {
        Self {
            weight: DEFAULT_WEIGHT,
            nodes: Vec::new(),
        }
    }

    /// Points per node. Only tests and benchmarks should change this; real
    /// clusters expect [`DEFAULT_WEIGHT`].
    pub fn with_weight(mut self, weight: usize) -> Self {
        self.weight = weight;
        self
    }

    /// Add node `index` whose data address is `addr`.
    pub fn add_node(mut self, index: usize, addr: impl Into<String>) -> Self {
        self.nodes.push((index, addr.into()));
        self
    }

    pub fn build(self) -> HashRing {
        // Colliding tokens go to the node added last, as in the reference
        // ketama implementation.
        let mut by_token = BTreeMap::new();
        let mut distinct = std::collections::BTreeSet::new();
        for (index, addr) in &self.nodes {
            distinct.insert(*index);
            for point in VirtualNode::points_for(*index, addr, self.weight) {
                by_token.insert(point.token, point.node);
            }
        }
        HashRing {
            points: by_token
                .into_iter()
                .map(|(token, node)| VirtualNode::new(token, node))
                .collect(),
            nodes: distinct.len(),
        }
    }
}

impl Default for RingBuilder {
    fn default() -> Self {
        Self::new()
    }
}
