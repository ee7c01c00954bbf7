//! Topology source of truth for the routing layer.
//!
//! This crate provides:
//! - [`ConfigurationProvider`]: the current [`ClusterConfig`](corelib::ClusterConfig)
//!   behind a lock-free snapshot, with bootstrap, acceptance of newer
//!   revisions, forced refresh and full reconnect
//! - [`ReconnectGate`]: the windowed threshold guarding full reconnects
//! - [`ConfigSource`]: the transport seam configurations are fetched through
//! - [`ProviderSettings`]: explicit configuration, no global state

pub mod error;
pub mod gate;
pub mod millis;
pub mod provider;
mod refresh;
pub mod settings;
pub mod source;

pub use error::{EndpointFailure, FetchError, ProviderError, Result};
pub use gate::{ReconnectGate, ReconnectState};
pub use provider::ConfigurationProvider;
pub use settings::{Credentials, ProviderSettings};
pub use source::{ConfigSource, ConfigStream, Endpoint};
