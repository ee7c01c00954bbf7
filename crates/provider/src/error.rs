//! Error types for configuration fetching and the provider.

use std::fmt;

/// Result type alias for the provider.
pub type Result<T> = std::result::Result<T, ProviderError>;

/// One endpoint that could not deliver a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointFailure {
    pub endpoint: String,
    pub reason: String,
}

impl fmt::Display for EndpointFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.endpoint, self.reason)
    }
}

/// Errors surfaced by [`ConfigurationProvider`](crate::ConfigurationProvider).
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Every endpoint tried failed. Fatal when raised during bootstrap.
    #[error("cluster unreachable: all {} endpoints failed", .failures.len())]
    ClusterUnreachable { failures: Vec<EndpointFailure> },

    #[error("invalid provider settings: {0}")]
    InvalidSettings(String),

    /// The provider was shut down; no further refreshes happen.
    #[error("configuration provider is shut down")]
    Shutdown,
}

/// Errors a [`ConfigSource`](crate::ConfigSource) reports for one endpoint.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Connection refused, DNS failure, network unreachable, ...
    #[error("unreachable: {0}")]
    Unreachable(String),

    /// The endpoint answered but refused to serve the bucket (bad
    /// credentials, unknown bucket).
    #[error("rejected: {0}")]
    Rejected(String),

    /// The endpoint served a document that is not a valid configuration.
    #[error(transparent)]
    Config(#[from] corelib::Error),
}
