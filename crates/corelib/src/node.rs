//! Node abstractions for the cluster topology.
//!
//! A [`Node`] pairs the address a server accepts keyed (data) traffic on
//! with the port it serves view queries on. Nodes are immutable once built
//! and cheap to compare and hash, so they double as keys for per-node
//! connection tables.

use std::fmt;

use crate::error::{Error, Result};

/// Default port of the view (HTTP query) service.
pub const DEFAULT_VIEW_PORT: u16 = 8092;

/// Logical server participating in the cluster.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Node {
    host: String,
    data_port: u16,
    view_port: u16,
}

impl Node {
    /// Construct a node from its host and both service ports.
    pub fn new(host: impl Into<String>, data_port: u16, view_port: u16) -> Self {
        Self {
            host: host.into(),
            data_port,
            view_port,
        }
    }

    /// Parse a `host:port` data address, using the default view port.
    pub fn parse(addr: &str) -> Result<Self> {
        let (host, port) = split_host_port(addr)?;
        Ok(Self::new(host, port, DEFAULT_VIEW_PORT))
    }

    /// Same node with a different view port.
    pub fn with_view_port(mut self, view_port: u16) -> Self {
        self.view_port = view_port;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn data_port(&self) -> u16 {
        self.data_port
    }

    pub fn view_port(&self) -> u16 {
        self.view_port
    }

    /// `host:port` of the data service.
    pub fn data_addr(&self) -> String {
        format!("{}:{}", self.host, self.data_port)
    }

    /// `host:port` of the view service.
    pub fn view_addr(&self) -> String {
        format!("{}:{}", self.host, self.view_port)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.data_port)
    }
}

/// Split `host:port` on the last colon.
pub(crate) fn split_host_port(addr: &str) -> Result<(&str, u16)> {
    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| Error::InvalidConfig(format!("address {addr:?} has no port")))?;
    if host.is_empty() {
        return Err(Error::InvalidConfig(format!("address {addr:?} has no host")));
    }
    let port = port
        .parse::<u16>()
        .map_err(|_| Error::InvalidConfig(format!("address {addr:?} has an invalid port")))?;
    Ok((host, port))
}
