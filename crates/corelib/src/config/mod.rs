//! Immutable cluster topology snapshots.
//!
//! A [`ClusterConfig`] is everything a client needs to route a key: the
//! ordered node list, the partition map (or, for unpartitioned buckets, the
//! ketama ring derived from the node list) and the revision the cluster
//! stamped on it. Snapshots are never patched; a topology change produces a
//! whole new snapshot that replaces the previous one.

mod diff;
mod document;

use std::sync::Arc;

pub use diff::ConfigDifference;

use crate::error::{Error, Result};
use crate::node::Node;
use crate::partition::{Partition, PartitionMap};
use crate::partitioner::KeyHasher;
use crate::ring::{HashRing, RingBuilder};

/// How keys are spread over the nodes of a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketKind {
    /// Keys hash into a fixed partition map with replicas.
    Partitioned,
    /// Keys hash onto a ketama ring; no replicas, no persistence.
    Unpartitioned,
}

#[derive(Debug, Clone)]
enum Layout {
    Partitioned {
        map: PartitionMap,
        hasher: Arc<dyn KeyHasher>,
        num_replicas: usize,
    },
    Unpartitioned {
        ring: HashRing,
    },
}

/// Immutable snapshot of the cluster topology.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    revision: u64,
    bucket: String,
    nodes: Vec<Node>,
    layout: Layout,
    /// `active[i]` is true when `nodes[i]` owns at least one partition.
    active: Vec<bool>,
}

impl ClusterConfig {
    /// Snapshot of a partitioned bucket.
    ///
    /// `partitions` are validated against `nodes`; `hasher` must be the
    /// algorithm the cluster advertises for this bucket.
    pub fn partitioned(
        revision: u64,
        nodes: Vec<Node>,
        partitions: Vec<Partition>,
        hasher: Arc<dyn KeyHasher>,
    ) -> Result<Self> {
        if nodes.is_empty() {
            return Err(Error::NoNodes);
        }
        let map = PartitionMap::new(partitions, nodes.len())?;
        let num_replicas = map.iter().map(Partition::replica_count).max().unwrap_or(0);
        let active = (0..nodes.len()).map(|i| map.owns_any(i)).collect();
        Ok(Self {
            revision,
            bucket: String::new(),
            nodes,
            layout: Layout::Partitioned {
                map,
                hasher,
                num_replicas,
            },
            active,
        })
    }

    /// Snapshot of an unpartitioned bucket; the ring is built here, once.
    pub fn unpartitioned(revision: u64, nodes: Vec<Node>) -> Result<Self> {
        if nodes.is_empty() {
            return Err(Error::NoNodes);
        }
        let ring = nodes
            .iter()
            .enumerate()
            .fold(RingBuilder::new(), |b, (i, n)| b.add_node(i, n.data_addr()))
            .build();
        Ok(Self {
            revision,
            bucket: String::new(),
            active: vec![true; nodes.len()],
            nodes,
            layout: Layout::Unpartitioned { ring },
        })
    }

    /// Parse the JSON bucket description published by the cluster.
    pub fn from_json(json: &str) -> Result<Self> {
        document::parse(json)
    }

    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = bucket.into();
        self
    }

    /// Copy of this snapshot stamped with another revision.
    pub fn with_revision(&self, revision: u64) -> Self {
        Self {
            revision,
            ..self.clone()
        }
    }

    /// Override the advertised replica count of a partitioned bucket.
    pub(crate) fn with_num_replicas(mut self, replicas: usize) -> Self {
        if let Layout::Partitioned { num_replicas, .. } = &mut self.layout {
            *num_replicas = replicas;
        }
        self
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn kind(&self) -> BucketKind {
        match self.layout {
            Layout::Partitioned { .. } => BucketKind::Partitioned,
            Layout::Unpartitioned { .. } => BucketKind::Unpartitioned,
        }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, index: usize) -> Option<&Node> {
        self.nodes.get(index)
    }

    pub fn index_of(&self, node: &Node) -> Option<usize> {
        self.nodes.iter().position(|n| n == node)
    }

    pub fn partition_map(&self) -> Option<&PartitionMap> {
        match &self.layout {
            Layout::Partitioned { map, .. } => Some(map),
            Layout::Unpartitioned { .. } => None,
        }
    }

    pub fn hasher(&self) -> Option<&dyn KeyHasher> {
        match &self.layout {
            Layout::Partitioned { hasher, .. } => Some(hasher.as_ref()),
            Layout::Unpartitioned { .. } => None,
        }
    }

    pub fn ring(&self) -> Option<&HashRing> {
        match &self.layout {
            Layout::Unpartitioned { ring } => Some(ring),
            Layout::Partitioned { .. } => None,
        }
    }

    /// Replica count the bucket is configured for (0 for unpartitioned).
    pub fn num_replicas(&self) -> usize {
        match self.layout {
            Layout::Partitioned { num_replicas, .. } => num_replicas,
            Layout::Unpartitioned { .. } => 0,
        }
    }

    /// True when `node` is listed and currently the active owner of at least
    /// one partition. Every listed node qualifies in an unpartitioned bucket.
    pub fn has_active_partitions(&self, node: &Node) -> bool {
        self.index_of(node)
            .map(|i| self.active[i])
            .unwrap_or(false)
    }

    /// Listed nodes that own at least one active partition, in list order.
    pub fn nodes_with_active_partitions(&self) -> impl Iterator<Item = &Node> {
        self.nodes
            .iter()
            .zip(&self.active)
            .filter_map(|(n, active)| active.then_some(n))
    }

    /// Compare against a newer snapshot.
    pub fn diff(&self, newer: &ClusterConfig) -> ConfigDifference {
        ConfigDifference::between(self, newer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partitioner::Crc32Hasher;

    fn nodes(n: usize) -> Vec<Node> {
        (0..n)
            .map(|i| Node::new(format!("10.0.0.{}", i + 1), 11210, 8092))
            .collect()
    }

    #[test]
    fn test_partitioned_marks_active_nodes() {
        let partitions = vec![
            Partition::new(Some(0), vec![Some(1)]),
            Partition::new(Some(1), vec![Some(0)]),
        ];
        let config =
            ClusterConfig::partitioned(3, nodes(3), partitions, Arc::new(Crc32Hasher)).unwrap();
        assert_eq!(config.kind(), BucketKind::Partitioned);
        assert_eq!(config.num_replicas(), 1);
        let active: Vec<_> = config.nodes_with_active_partitions().cloned().collect();
        assert_eq!(active, nodes(2));
        assert!(!config.has_active_partitions(&nodes(3)[2]));
    }

    #[test]
    fn test_unpartitioned_all_nodes_active() {
        let config = ClusterConfig::unpartitioned(1, nodes(3)).unwrap();
        assert_eq!(config.kind(), BucketKind::Unpartitioned);
        assert_eq!(config.num_replicas(), 0);
        assert_eq!(config.nodes_with_active_partitions().count(), 3);
        assert_eq!(config.ring().unwrap().node_count(), 3);
    }

    #[test]
    fn test_empty_node_list_rejected() {
        assert_eq!(
            ClusterConfig::unpartitioned(1, vec![]).unwrap_err(),
            Error::NoNodes
        );
    }

    #[test]
    fn test_with_revision_keeps_topology() {
        let config = ClusterConfig::unpartitioned(1, nodes(2)).unwrap();
        let bumped = config.with_revision(9);
        assert_eq!(bumped.revision(), 9);
        assert_eq!(bumped.nodes(), config.nodes());
    }
}
