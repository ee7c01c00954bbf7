//! Durability checks for writes.
//!
//! This crate provides:
//! - [`DurabilityRequirement`]: how many nodes must persist and replicate a
//!   mutation before the caller considers it durable
//! - [`Observer`]: the seam observe requests are sent through
//! - [`DurabilityTracker`]: polls the master and replicas of a key until the
//!   requirement is met, the deadline passes or another write wins

pub mod error;
pub mod observe;
pub mod requirement;
pub mod tracker;

pub use error::{DurabilityError, ObserveError, Result};
pub use observe::{Mutation, MutationKind, ObserveReply, ObserveStatus, Observer};
pub use requirement::{DurabilityRequirement, PersistTo, ReplicateTo};
pub use tracker::{DurabilityHandle, DurabilityReport, DurabilityTracker, ObserveSettings};
