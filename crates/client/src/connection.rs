//! Per-node connection seam.
//!
//! The router never encodes frames itself. Requests and responses are the
//! decoded form of the key/value protocol; turning them into bytes on a
//! socket is the job of the [`NodeConnection`] the application plugs in.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use corelib::{ClusterConfig, Node};
use durability::ObserveReply;
use provider::Credentials;

/// Connection-level failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    /// Refused, reset, DNS failure, ...
    #[error("unreachable: {0}")]
    Unreachable(String),

    #[error("connection closed")]
    Closed,

    /// The peer sent something that could not be decoded.
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Key/value operation carried by a [`Request`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Get,
    /// Read from replica slot `index` (0-based).
    GetReplica { index: usize },
    Upsert {
        value: Bytes,
        cas: Option<u64>,
        expiry: u32,
    },
    Remove { cas: Option<u64> },
    Observe,
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Get => "get",
            Operation::GetReplica { .. } => "get_replica",
            Operation::Upsert { .. } => "upsert",
            Operation::Remove { .. } => "remove",
            Operation::Observe => "observe",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub key: Bytes,
    /// Partition the key hashed to; `None` on unpartitioned buckets.
    pub partition: Option<u16>,
    pub op: Operation,
}

#[derive(Debug, Clone)]
pub enum Response {
    Value { value: Bytes, cas: u64 },
    Stored { cas: u64 },
    Removed { cas: u64 },
    Observed(ObserveReply),
    KeyNotFound,
    CasMismatch,
    /// The node does not own the key's partition. It may attach the
    /// configuration it believes in.
    NotMyPartition { config: Option<ClusterConfig> },
}

/// One open connection to a node's data port.
#[async_trait]
pub trait NodeConnection: Send + Sync + 'static {
    async fn send(&self, request: Request) -> Result<Response, ConnectionError>;

    /// Release the connection. Called when its node leaves the topology.
    async fn close(&self) {}
}

/// Opens [`NodeConnection`]s on demand.
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    async fn connect(
        &self,
        node: &Node,
        bucket: &str,
        credentials: &Credentials,
    ) -> Result<Arc<dyn NodeConnection>, ConnectionError>;
}
