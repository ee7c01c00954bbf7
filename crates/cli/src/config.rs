//! Command-line arguments.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use corelib::ClusterConfig;
use tracing::debug;

use crate::commands::{Command, CommandResult};

#[derive(Debug, Parser)]
#[command(name = "routectl")]
#[command(about = "Inspect how a cluster configuration routes keys and queries")]
pub struct CliConfig {
    #[command(subcommand)]
    pub command: Args,
}

#[derive(Debug, Subcommand)]
pub enum Args {
    /// Show the partition, active node and replicas of each key.
    Locate {
        #[arg(long)]
        config: PathBuf,
        #[arg(required = true)]
        keys: Vec<String>,
    },
    /// List the hosts view queries rotate over.
    Hosts {
        #[arg(long)]
        config: PathBuf,
    },
    /// Compare two revisions of a configuration.
    Diff { old: PathBuf, new: PathBuf },
}

impl CliConfig {
    pub fn run(self) -> Result<CommandResult> {
        let command = match self.command {
            Args::Locate { config, keys } => Command::Locate {
                config: load(&config)?,
                keys,
            },
            Args::Hosts { config } => Command::Hosts {
                config: load(&config)?,
            },
            Args::Diff { old, new } => Command::Diff {
                old: load(&old)?,
                new: load(&new)?,
            },
        };
        command.execute()
    }
}

/// Read and parse a JSON bucket description.
pub fn load(path: &Path) -> Result<ClusterConfig> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("failed to read config '{}'", path.display()))?;
    let config = ClusterConfig::from_json(&json)
        .with_context(|| format!("failed to parse config '{}'", path.display()))?;
    debug!(
        path = %path.display(),
        revision = config.revision(),
        nodes = config.nodes().len(),
        "loaded cluster config"
    );
    Ok(config)
}
