//! Durability requirements.
//!
//! A write acknowledged by the master is only in the master's memory. A
//! caller that needs more says how many nodes must have written the mutation
//! to disk ([`PersistTo`]) and how many replicas must hold it in memory
//! ([`ReplicateTo`]).
//!
//! # Satisfiability
//!
//! A partition with `r` replicas has `r + 1` copies in total, so at most
//! `r + 1` nodes can persist and at most `r` can replicate. Anything larger
//! can never be met and is rejected up front by [`check`].
//!
//! [`check`]: DurabilityRequirement::check

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{DurabilityError, Result};

/// Number of nodes that must persist a mutation to disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersistTo {
    #[default]
    None,
    /// The master itself, whatever the replicas report.
    Master,
    One,
    Two,
    Three,
    Four,
}

impl PersistTo {
    /// Number of persisted copies this level asks for.
    pub fn count(self) -> usize {
        match self {
            PersistTo::None => 0,
            PersistTo::Master | PersistTo::One => 1,
            PersistTo::Two => 2,
            PersistTo::Three => 3,
            PersistTo::Four => 4,
        }
    }

    /// Level for a plain count, `None` above four.
    pub fn from_count(count: usize) -> Option<Self> {
        match count {
            0 => Some(PersistTo::None),
            1 => Some(PersistTo::One),
            2 => Some(PersistTo::Two),
            3 => Some(PersistTo::Three),
            4 => Some(PersistTo::Four),
            _ => None,
        }
    }

    /// Whether replicas have to be asked at all. A single persisted copy is
    /// checked on the master alone.
    pub fn touches_replica(self) -> bool {
        self.count() > 1
    }
}

/// Number of replicas that must hold a mutation in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplicateTo {
    #[default]
    None,
    One,
    Two,
    Three,
}

impl ReplicateTo {
    pub fn count(self) -> usize {
        match self {
            ReplicateTo::None => 0,
            ReplicateTo::One => 1,
            ReplicateTo::Two => 2,
            ReplicateTo::Three => 3,
        }
    }

    pub fn from_count(count: usize) -> Option<Self> {
        match count {
            0 => Some(ReplicateTo::None),
            1 => Some(ReplicateTo::One),
            2 => Some(ReplicateTo::Two),
            3 => Some(ReplicateTo::Three),
            _ => None,
        }
    }

    pub fn touches_replica(self) -> bool {
        self != ReplicateTo::None
    }
}

/// Per-write durability target.
///
/// # Example
///
/// ```rust
/// use durability::{DurabilityRequirement, PersistTo, ReplicateTo};
///
/// let req = DurabilityRequirement::new(PersistTo::Two, ReplicateTo::One);
/// assert!(req.check(2).is_ok());
/// assert!(req.check(0).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DurabilityRequirement {
    pub persist_to: PersistTo,
    pub replicate_to: ReplicateTo,
}

impl DurabilityRequirement {
    /// Fire-and-forget: the master's acknowledgement is enough.
    pub const NONE: Self = Self {
        persist_to: PersistTo::None,
        replicate_to: ReplicateTo::None,
    };

    pub fn new(persist_to: PersistTo, replicate_to: ReplicateTo) -> Self {
        Self {
            persist_to,
            replicate_to,
        }
    }

    pub fn persist(persist_to: PersistTo) -> Self {
        Self::new(persist_to, ReplicateTo::None)
    }

    pub fn replicate(replicate_to: ReplicateTo) -> Self {
        Self::new(PersistTo::None, replicate_to)
    }

    pub fn is_none(&self) -> bool {
        self.persist_to == PersistTo::None && self.replicate_to == ReplicateTo::None
    }

    /// Reject a requirement a partition with `replicas` replicas can never
    /// meet.
    pub fn check(&self, replicas: usize) -> Result<()> {
        if self.persist_to.count() > replicas + 1 || self.replicate_to.count() > replicas {
            return Err(DurabilityError::InsufficientTopology {
                requirement: *self,
                replicas,
            });
        }
        Ok(())
    }
}

impl fmt::Display for DurabilityRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "persist_to={:?}, replicate_to={:?}",
            self.persist_to, self.replicate_to
        )
    }
}
