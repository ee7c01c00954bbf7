//! Partition (vbucket) map.

use crate::error::{Error, Result};

/// Most replicas a partition can have.
pub const MAX_REPLICAS: usize = 3;

/// Most partitions a map can hold.
pub const MAX_PARTITIONS: usize = 65536;

/// One shard of the keyspace: an active owner and up to [`MAX_REPLICAS`]
/// replica slots. Slots hold node indices into the owning configuration;
/// `None` means "nobody", which is normal for replicas on a small cluster and
/// transient for the active slot during failover.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    active: Option<usize>,
    replicas: Vec<Option<usize>>,
}

impl Partition {
    pub fn new(active: Option<usize>, replicas: Vec<Option<usize>>) -> Self {
        Self { active, replicas }
    }

    /// Build from the wire form: `[master, replica1, ...]`, `-1` for empty.
    pub fn from_wire(entry: &[i32]) -> Self {
        let slot = |v: i32| usize::try_from(v).ok();
        let mut iter = entry.iter().copied();
        let active = iter.next().and_then(slot);
        Self::new(active, iter.map(slot).collect())
    }

    pub fn active(&self) -> Option<usize> {
        self.active
    }

    /// The `index`-th replica slot (0-based).
    pub fn replica(&self, index: usize) -> Option<usize> {
        self.replicas.get(index).copied().flatten()
    }

    /// Assigned replicas in slot order.
    pub fn replicas(&self) -> impl Iterator<Item = usize> + '_ {
        self.replicas.iter().filter_map(|r| *r)
    }

    /// Number of replica slots that currently have a node.
    pub fn replica_count(&self) -> usize {
        self.replicas().count()
    }

    fn slot_count(&self) -> usize {
        self.replicas.len()
    }
}

/// Fixed-size, power-of-two array of partitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionMap {
    entries: Vec<Partition>,
    mask: u32,
}

impl PartitionMap {
    /// Validate and wrap a list of partitions.
    ///
    /// Fails when the length is not a non-zero power of two (at most
    /// [`MAX_PARTITIONS`]), when a partition has more than
    /// [`MAX_REPLICAS`] replica slots, or when a slot points past
    /// `node_count`.
    pub fn new(entries: Vec<Partition>, node_count: usize) -> Result<Self> {
        let len = entries.len();
        if len == 0 || !len.is_power_of_two() || len > MAX_PARTITIONS {
            return Err(Error::InvalidConfig(format!(
                "number of partitions must be a power of two, > 0 and <= {MAX_PARTITIONS} (got {len})"
            )));
        }
        for (idx, p) in entries.iter().enumerate() {
            if p.slot_count() > MAX_REPLICAS {
                return Err(Error::InvalidConfig(format!(
                    "partition {idx} lists {} replicas, expected <= {MAX_REPLICAS}",
                    p.slot_count()
                )));
            }
            let out_of_range = p
                .active
                .into_iter()
                .chain(p.replicas())
                .find(|n| *n >= node_count);
            if let Some(n) = out_of_range {
                return Err(Error::InvalidConfig(format!(
                    "partition {idx} references node {n} but only {node_count} nodes exist"
                )));
            }
        }
        Ok(Self {
            mask: (len - 1) as u32,
            entries,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Partition index for a key hash.
    pub fn index_for(&self, hash: u32) -> u16 {
        (hash & self.mask) as u16
    }

    pub fn get(&self, index: u16) -> Option<&Partition> {
        self.entries.get(usize::from(index))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Partition> {
        self.entries.iter()
    }

    /// True if `node` is the active owner of at least one partition.
    pub fn owns_any(&self, node: usize) -> bool {
        self.entries.iter().any(|p| p.active == Some(node))
    }
}
