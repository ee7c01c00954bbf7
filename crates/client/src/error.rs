//! Error types for routing, view queries and the client facade.

use std::time::Duration;

use corelib::Node;
use durability::DurabilityError;
use provider::ProviderError;

use crate::connection::ConnectionError;

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Why a keyed operation (or the client itself) failed.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Configuration could not be obtained; `ClusterUnreachable` lives here.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// The key could not be placed, typically `NoActiveOwner` that outlasted
    /// the retry bound.
    #[error(transparent)]
    Routing(#[from] corelib::Error),

    /// Nodes kept answering "not my partition" past the retry bound.
    #[error("ownership retries exhausted after {attempts} attempts")]
    OwnershipRetriesExhausted { attempts: u32 },

    #[error("node {node} unreachable: {source}")]
    NodeUnreachable {
        node: Node,
        #[source]
        source: ConnectionError,
    },

    /// Replica slot beyond what the bucket is configured for.
    #[error("replica {index} requested but the bucket has {replicas} replicas")]
    InvalidReplica { index: usize, replicas: usize },

    #[error("operation timed out after {after:?}")]
    Timeout { after: Duration },

    #[error("key not found")]
    KeyNotFound,

    /// The CAS supplied with the write no longer matches the stored one.
    #[error("cas mismatch")]
    CasMismatch,

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error(transparent)]
    Durability(#[from] DurabilityError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("invalid client settings: {0}")]
    InvalidSettings(String),

    /// The client was shut down before or during the operation.
    #[error("client is shut down")]
    Shutdown,
}

impl ClientError {
    /// True when the same call may succeed later without any change on the
    /// caller's side.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Provider(ProviderError::ClusterUnreachable { .. }) => true,
            ClientError::Routing(e) => e.is_retryable(),
            ClientError::NodeUnreachable { .. } | ClientError::Timeout { .. } => true,
            ClientError::Durability(e) => e.is_retryable(),
            ClientError::Pool(e) => e.is_retryable(),
            _ => false,
        }
    }
}

/// Errors from the view connection pool.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// No node currently qualifies for query traffic. The query is cancelled
    /// rather than queued.
    #[error("no view hosts available")]
    NoHostsAvailable,

    #[error("view pool is shut down")]
    PoolShutdown,

    #[error("view query on {host} failed: {source}")]
    Transport {
        host: Node,
        #[source]
        source: ConnectionError,
    },
}

impl PoolError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, PoolError::NoHostsAvailable | PoolError::Transport { .. })
    }
}
