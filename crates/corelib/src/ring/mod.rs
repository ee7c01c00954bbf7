//! Consistent hash ring implementation.
//!
//! The ring holds the points of every node in an unpartitioned bucket and
//! answers "which node owns this key". It is rebuilt from scratch whenever a
//! new configuration arrives and never mutated afterwards.

pub mod ring;

pub use ring::{HashRing, RingBuilder};
