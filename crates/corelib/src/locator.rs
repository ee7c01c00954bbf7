//! Key → node routing.
//!
//! Routing is a pure function of `(key, snapshot)`: no caches, no hidden
//! state, so two threads holding the same snapshot always agree on where a
//! key lives.

use crate::config::ClusterConfig;
use crate::error::{Error, Result};
use crate::node::Node;

/// Where a key should be sent, derived per operation from a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingDecision {
    /// Partition index, `None` for unpartitioned buckets.
    pub partition: Option<u16>,
    /// Node that accepts reads and writes for the key.
    pub target: Node,
    /// Assigned replica nodes in replica-slot order.
    pub replicas: Vec<Node>,
}

/// Partition index for `key`, or `None` for unpartitioned buckets.
pub fn partition_for(key: &[u8], config: &ClusterConfig) -> Option<u16> {
    let map = config.partition_map()?;
    let hasher = config.hasher()?;
    Some(map.index_for(hasher.hash(key)))
}

/// Resolve the owner (and replicas) of `key`.
///
/// Fails with [`Error::NoActiveOwner`] while the key's partition has no
/// active node; that condition is transient and callers should retry after
/// a short pause.
pub fn locate(key: &[u8], config: &ClusterConfig) -> Result<RoutingDecision> {
    match (config.partition_map(), config.hasher()) {
        (Some(map), Some(hasher)) => {
            let partition = map.index_for(hasher.hash(key));
            let entry = map.get(partition).ok_or(Error::NoActiveOwner { partition })?;
            let target = entry
                .active()
                .and_then(|i| config.node(i))
                .ok_or(Error::NoActiveOwner { partition })?;
            let replicas = entry
                .replicas()
                .filter_map(|i| config.node(i))
                .cloned()
                .collect();
            Ok(RoutingDecision {
                partition: Some(partition),
                target: target.clone(),
                replicas,
            })
        }
        _ => {
            let ring = config.ring().ok_or(Error::NoNodes)?;
            let target = ring
                .lookup(key)
                .and_then(|i| config.node(i))
                .ok_or(Error::NoNodes)?;
            Ok(RoutingDecision {
                partition: None,
                target: target.clone(),
                replicas: Vec::new(),
            })
        }
    }
}

/// Resolve the node holding replica `index` (0-based) of `key`.
pub fn locate_replica(key: &[u8], index: usize, config: &ClusterConfig) -> Result<Node> {
    let partition = partition_for(key, config).ok_or(Error::NoActiveOwner { partition: 0 })?;
    config
        .partition_map()
        .and_then(|m| m.get(partition))
        .and_then(|p| p.replica(index))
        .and_then(|i| config.node(i))
        .cloned()
        .ok_or(Error::NoActiveOwner { partition })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::partition::Partition;
    use crate::partitioner::{Crc32Hasher, KeyHasher};

    fn nodes() -> Vec<Node> {
        vec![
            Node::new("10.0.0.1", 11210, 8092),
            Node::new("10.0.0.2", 11210, 8092),
            Node::new("10.0.0.3", 11210, 8092),
        ]
    }

    /// 1024 partitions, master `p % 3`, replicas on the next two nodes.
    fn partitioned() -> ClusterConfig {
        let partitions = (0..1024)
            .map(|p| Partition::new(Some(p % 3), vec![Some((p + 1) % 3), Some((p + 2) % 3)]))
            .collect();
        ClusterConfig::partitioned(1, nodes(), partitions, Arc::new(Crc32Hasher)).unwrap()
    }

    #[test]
    fn test_partition_follows_hash() {
        let config = partitioned();
        let expected = (Crc32Hasher.hash(b"123456789") & 1023) as u16;
        assert_eq!(partition_for(b"123456789", &config), Some(expected));

        let decision = locate(b"123456789", &config).unwrap();
        assert_eq!(decision.partition, Some(expected));
        assert_eq!(decision.target, nodes()[usize::from(expected) % 3]);
        assert_eq!(decision.replicas.len(), 2);
        assert!(!decision.replicas.contains(&decision.target));
    }

    #[test]
    fn test_no_active_owner_fails_fast() {
        let partitions = vec![Partition::new(None, vec![Some(0)]); 4];
        let config =
            ClusterConfig::partitioned(1, nodes(), partitions, Arc::new(Crc32Hasher)).unwrap();
        let err = locate(b"key", &config).unwrap_err();
        assert!(matches!(err, Error::NoActiveOwner { .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_locate_replica() {
        let config = partitioned();
        let decision = locate(b"user::42", &config).unwrap();
        assert_eq!(locate_replica(b"user::42", 0, &config).unwrap(), decision.replicas[0]);
        assert_eq!(locate_replica(b"user::42", 1, &config).unwrap(), decision.replicas[1]);
        assert!(locate_replica(b"user::42", 2, &config).is_err());
    }

    #[test]
    fn test_unpartitioned_has_no_replicas() {
        let config = ClusterConfig::unpartitioned(1, nodes()).unwrap();
        let decision = locate(b"user::42", &config).unwrap();
        assert_eq!(decision.partition, None);
        assert!(decision.replicas.is_empty());
        assert!(nodes().contains(&decision.target));
        assert!(locate_replica(b"user::42", 0, &config).is_err());
    }

    #[test]
    fn test_same_snapshot_same_answer() {
        let config = partitioned();
        for key in ["a", "b", "c", "some-longer-key"] {
            assert_eq!(
                locate(key.as_bytes(), &config).unwrap(),
                locate(key.as_bytes(), &config.clone()).unwrap()
            );
        }
    }
}
