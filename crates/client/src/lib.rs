//! Topology-aware client for a partitioned, replicated key/value cluster.
//!
//! This crate provides:
//! - [`RequestRouter`]: sends keyed operations to the node owning the key
//!   and reroutes on ownership mismatches, missing owners and dead nodes
//! - [`ViewConnectionPool`]: round-robin view hosts reconciled against each
//!   new topology
//! - [`Client`]: get, replica get, put, remove and view queries, with
//!   optional durability checks and graceful shutdown
//!
//! The network itself is behind the [`ConnectionFactory`] and
//! [`ViewTransport`] seams; configuration comes through
//! [`provider::ConfigSource`].

pub mod client;
pub mod connection;
pub mod error;
pub mod observer;
pub mod pool;
pub mod router;
pub mod settings;

pub use client::{
    Client, ClientIo, Document, MutationResult, PutOptions, ReadOptions, RemoveOptions,
};
pub use connection::{
    ConnectionError, ConnectionFactory, NodeConnection, Operation, Request, Response,
};
pub use error::{ClientError, PoolError, Result};
pub use observer::RouterObserver;
pub use pool::{RowStream, ViewConnectionPool, ViewQuery, ViewTransport};
pub use router::{RequestRouter, Target};
pub use settings::Settings;
