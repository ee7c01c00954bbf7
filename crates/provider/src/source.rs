//! Where configurations come from.
//!
//! The provider never talks to the network itself. The application supplies
//! a [`ConfigSource`] that knows how to fetch a bucket configuration from a
//! seed (REST/config port) or from a node already in the topology, and
//! optionally how to keep a push stream open.

use std::fmt;

use async_trait::async_trait;
use corelib::{ClusterConfig, Node};
use futures::stream::BoxStream;

use crate::error::FetchError;
use crate::settings::Credentials;

/// Stream of configurations pushed by the cluster.
pub type ConfigStream = BoxStream<'static, Result<ClusterConfig, FetchError>>;

/// Something that can be asked for the current configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// `host:port` from the seed list.
    Seed(String),
    /// A node of the current topology.
    Node(Node),
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Seed(seed) => write!(f, "seed {seed}"),
            Endpoint::Node(node) => write!(f, "node {node}"),
        }
    }
}

/// Transport seam for configuration retrieval.
#[async_trait]
pub trait ConfigSource: Send + Sync + 'static {
    /// Fetch the current configuration of `bucket` from `endpoint`.
    async fn fetch(
        &self,
        endpoint: &Endpoint,
        bucket: &str,
        credentials: &Credentials,
    ) -> Result<ClusterConfig, FetchError>;

    /// Open a push stream of configurations. Sources that can only be polled
    /// keep the default, which returns `Ok(None)`.
    async fn subscribe(
        &self,
        _endpoint: &Endpoint,
        _bucket: &str,
        _credentials: &Credentials,
    ) -> Result<Option<ConfigStream>, FetchError> {
        Ok(None)
    }
}
