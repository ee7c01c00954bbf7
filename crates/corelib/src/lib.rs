//! Core library for cluster-topology-aware routing.
//!
//! This crate provides the immutable building blocks every other layer reads:
//! - Node identities
//! - Partition maps and cluster configuration snapshots
//! - Protocol-mandated key hashers
//! - The ketama ring for unpartitioned buckets
//! - Key location (owner and replicas of a key)

pub mod config;
pub mod error;
pub mod locator;
pub mod node;
pub mod partition;
pub mod partitioner;
pub mod ring;
pub mod vnode;

pub use config::{BucketKind, ClusterConfig, ConfigDifference};
pub use error::{Error, Result};
pub use locator::{locate, locate_replica, partition_for, RoutingDecision};
pub use node::Node;
pub use partition::{Partition, PartitionMap};
pub use partitioner::KeyHasher;
pub use ring::{HashRing, RingBuilder};
pub use vnode::VirtualNode;
