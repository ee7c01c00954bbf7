//! Tests for the ketama ring and key location over unpartitioned buckets.
//!
//! # Test Strategy
//!
//! 1. **Basic functionality**: Empty ring, single node, lookups
//! 2. **Multiple nodes**: Distribution, consistency
//! 3. **Topology change**: removing a node only moves that node's keys
//! 4. **Properties**: agreement between identical snapshots

use corelib::node::Node;
use corelib::ring::{HashRing, RingBuilder};
use corelib::{locate, ClusterConfig};
use proptest::prelude::*;

fn addr(i: usize) -> String {
    format!("10.0.0.{}:11211", i + 1)
}

fn ring_of(n: usize) -> HashRing {
    (0..n)
        .fold(RingBuilder::new(), |b, i| b.add_node(i, addr(i)))
        .build()
}

// ============================================================================
// Basic Functionality Tests
// ============================================================================

#[test]
fn test_empty_ring_lookup() {
    let ring = RingBuilder::new().build();
    assert_eq!(ring.lookup(b"key1"), None);
    assert_eq!(ring.node_count(), 0);
    assert_eq!(ring.token_count(), 0);
}

#[test]
fn test_single_node() {
    let ring = ring_of(1);
    for key in ["key1", "key2", "key3", "very-long-key-name"] {
        assert_eq!(ring.lookup(key.as_bytes()), Some(0), "All keys should map to single node");
    }
}

#[test]
fn test_default_weight() {
    let ring = ring_of(2);
    assert_eq!(ring.node_count(), 2);
    // 160 points per node; a collision would only ever lower this.
    assert!(ring.token_count() <= 320);
    assert!(ring.token_count() > 300);
}

#[test]
fn test_custom_weight() {
    let ring = RingBuilder::new()
        .with_weight(8)
        .add_node(0, addr(0))
        .add_node(1, addr(1))
        .build();
    assert_eq!(ring.node_count(), 2);
    assert_eq!(ring.token_count(), 16);
}

#[test]
fn test_points_are_sorted() {
    let ring = ring_of(3);
    assert!(ring.points().windows(2).all(|w| w[0].token < w[1].token));
}

#[test]
fn test_lookup_wraps_past_last_point() {
    let ring = ring_of(3);
    let first = ring.points()[0];
    assert_eq!(ring.lookup_hash(u32::MAX), Some(first.node));
    assert_eq!(ring.lookup_hash(first.token), Some(first.node));
}

// ============================================================================
// Multiple Nodes Tests
// ============================================================================

#[test]
fn test_keys_spread_over_nodes() {
    let ring = ring_of(3);
    let mut counts = [0usize; 3];
    for i in 0..3000 {
        let owner = ring.lookup(format!("key-{i}").as_bytes()).unwrap();
        counts[owner] += 1;
    }
    for c in counts {
        assert!(c > 500, "distribution too skewed: {counts:?}");
    }
}

#[test]
fn test_removing_node_only_moves_its_keys() {
    let before = ring_of(3);
    // Same addresses for nodes 0 and 1; node 2 is gone.
    let after = ring_of(2);

    for i in 0..2000 {
        let key = format!("key-{i}");
        let old = before.lookup(key.as_bytes()).unwrap();
        let new = after.lookup(key.as_bytes()).unwrap();
        if old != 2 {
            assert_eq!(old, new, "{key} moved although its owner stayed");
        }
    }
}

#[test]
fn test_locate_on_unpartitioned_config() {
    let nodes: Vec<Node> = (0..3).map(|i| Node::parse(&addr(i)).unwrap()).collect();
    let config = ClusterConfig::unpartitioned(1, nodes.clone()).unwrap();
    let decision = locate(b"consistent-key", &config).unwrap();
    let owner = ring_of(3).lookup(b"consistent-key").unwrap();
    assert_eq!(decision.target, nodes[owner]);
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn prop_lookup_is_deterministic(key in proptest::collection::vec(any::<u8>(), 0..64)) {
        let a = ring_of(4);
        let b = ring_of(4);
        prop_assert_eq!(a.lookup(&key), b.lookup(&key));
        prop_assert!(a.lookup(&key).unwrap() < 4);
    }
}
