//! Offline inspection of cluster configuration documents.
//!
//! Provides commands for:
//! - Locating keys (partition, active node, replicas)
//! - Listing the hosts view queries rotate over
//! - Diffing two revisions of a configuration

pub mod commands;
pub mod config;

pub use commands::{Command, CommandResult};
pub use config::CliConfig;
