//! Differences between two topology snapshots.

use super::ClusterConfig;

/// What changed between two snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigDifference {
    /// Node list differs in length or order.
    pub sequence_changed: bool,
    /// Partitions whose active owner moved, or `None` when the two maps
    /// cannot be compared (different sizes or an unpartitioned side).
    pub partition_changes: Option<usize>,
}

impl ConfigDifference {
    pub(super) fn between(old: &ClusterConfig, new: &ClusterConfig) -> Self {
        let sequence_changed = old.nodes() != new.nodes();
        let partition_changes = match (old.partition_map(), new.partition_map()) {
            (Some(a), Some(b)) if a.len() == b.len() => Some(
                a.iter()
                    .zip(b.iter())
                    .filter(|(x, y)| x.active() != y.active())
                    .count(),
            ),
            _ => None,
        };
        Self {
            sequence_changed,
            partition_changes,
        }
    }

    /// True when routing could differ between the two snapshots.
    pub fn is_significant(&self) -> bool {
        self.sequence_changed || self.partition_changes != Some(0)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::node::Node;
    use crate::partition::Partition;
    use crate::partitioner::Crc32Hasher;
    use crate::ClusterConfig;

    fn config(owners: &[usize]) -> ClusterConfig {
        let nodes = vec![Node::new("a", 11210, 8092), Node::new("b", 11210, 8092)];
        let partitions = owners
            .iter()
            .map(|o| Partition::new(Some(*o), vec![]))
            .collect();
        ClusterConfig::partitioned(1, nodes, partitions, Arc::new(Crc32Hasher)).unwrap()
    }

    #[test]
    fn test_identical_maps() {
        let d = config(&[0, 1]).diff(&config(&[0, 1]));
        assert!(!d.sequence_changed);
        assert_eq!(d.partition_changes, Some(0));
        assert!(!d.is_significant());
    }

    #[test]
    fn test_moved_partitions_are_counted() {
        let d = config(&[0, 1, 0, 1]).diff(&config(&[1, 1, 1, 1]));
        assert_eq!(d.partition_changes, Some(2));
        assert!(d.is_significant());
    }

    #[test]
    fn test_resized_map_is_not_comparable() {
        let d = config(&[0, 1]).diff(&config(&[0, 1, 0, 1]));
        assert_eq!(d.partition_changes, None);
        assert!(d.is_significant());
    }
}
