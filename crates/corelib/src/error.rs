//! Error types for the core library.

/// Result type alias for the core library.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building topology snapshots or locating keys.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The configuration document violates a topology invariant.
    #[error("invalid cluster configuration: {0}")]
    InvalidConfig(String),

    /// The configuration names a hash algorithm nobody registered.
    #[error("unhandled hash algorithm type: {0}")]
    UnknownHashAlgorithm(String),

    /// The configuration document could not be decoded at all.
    #[error("malformed configuration document: {0}")]
    Parse(String),

    /// The partition (or the requested replica slot) has no node assigned,
    /// typically while a failover is in progress.
    #[error("partition {partition} has no active owner")]
    NoActiveOwner { partition: u16 },

    /// The snapshot has no node to route to.
    #[error("cluster configuration lists no nodes")]
    NoNodes,
}

impl Error {
    /// True for conditions that are expected to clear on their own once the
    /// cluster publishes a newer configuration.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::NoActiveOwner { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Parse(e.to_string())
    }
}
