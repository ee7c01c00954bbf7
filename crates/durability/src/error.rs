//! Error types for durability checks.

use crate::requirement::DurabilityRequirement;

/// Result type alias for durability checks.
pub type Result<T> = std::result::Result<T, DurabilityError>;

/// Why a mutation could not be confirmed durable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DurabilityError {
    /// The requirement asks for more nodes than the key's partition has.
    /// Raised before any observe request is sent.
    #[error("cannot satisfy {requirement} with {replicas} replicas")]
    InsufficientTopology {
        requirement: DurabilityRequirement,
        replicas: usize,
    },

    /// The deadline passed first. Normal under load.
    #[error("durability not reached in time (persisted {persisted}, replicated {replicated})")]
    DurabilityTimeout { persisted: usize, replicated: usize },

    /// Another write replaced the observed mutation.
    #[error("mutation superseded: expected cas {expected}, observed {observed}")]
    Superseded { expected: u64, observed: u64 },

    /// The poll was cancelled by its caller or by shutdown.
    #[error("durability check cancelled")]
    Cancelled,

    /// The key could not be placed in the topology.
    #[error(transparent)]
    Routing(#[from] corelib::Error),
}

impl DurabilityError {
    pub fn is_retryable(&self) -> bool {
        match self {
            DurabilityError::DurabilityTimeout { .. } => true,
            DurabilityError::Routing(e) => e.is_retryable(),
            _ => false,
        }
    }
}

/// One observe request that failed. Counts as "not yet" for that round.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("observe on {node} failed: {reason}")]
pub struct ObserveError {
    pub node: String,
    pub reason: String,
}

impl ObserveError {
    pub fn new(node: impl ToString, reason: impl Into<String>) -> Self {
        Self {
            node: node.to_string(),
            reason: reason.into(),
        }
    }
}
