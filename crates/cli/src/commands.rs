//! Command implementations, kept free of I/O so they can be tested on
//! in-memory configurations.

use anyhow::Result;
use corelib::{locate, ClusterConfig, Error};

/// A parsed command with its configurations loaded.
#[derive(Debug)]
pub enum Command {
    Locate { config: ClusterConfig, keys: Vec<String> },
    Hosts { config: ClusterConfig },
    Diff { old: ClusterConfig, new: ClusterConfig },
}

/// Output lines of a command.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct CommandResult {
    pub lines: Vec<String>,
}

impl Command {
    pub fn execute(&self) -> Result<CommandResult> {
        let lines = match self {
            Command::Locate { config, keys } => keys.iter().map(|k| locate_line(k, config)).collect(),
            Command::Hosts { config } => config
                .nodes_with_active_partitions()
                .map(|n| n.view_addr())
                .collect(),
            Command::Diff { old, new } => diff_lines(old, new),
        };
        Ok(CommandResult { lines })
    }
}

fn locate_line(key: &str, config: &ClusterConfig) -> String {
    match locate(key.as_bytes(), config) {
        Ok(decision) => {
            let partition = decision
                .partition
                .map_or_else(|| "-".to_string(), |p| p.to_string());
            let replicas: Vec<String> = decision.replicas.iter().map(|n| n.to_string()).collect();
            format!(
                "{key}\tpartition={partition}\tactive={}\treplicas=[{}]",
                decision.target,
                replicas.join(",")
            )
        }
        Err(Error::NoActiveOwner { partition }) => {
            format!("{key}\tpartition={partition}\tactive=none")
        }
        Err(e) => format!("{key}\terror={e}"),
    }
}

fn diff_lines(old: &ClusterConfig, new: &ClusterConfig) -> Vec<String> {
    let diff = old.diff(new);
    let moved = match diff.partition_changes {
        Some(n) => n.to_string(),
        None => "not comparable".to_string(),
    };
    let accepted = if new.revision() > old.revision() {
        "yes"
    } else {
        "no (stale revision)"
    };
    vec![
        format!("revision: {} -> {}", old.revision(), new.revision()),
        format!("nodes changed: {}", diff.sequence_changed),
        format!("partitions moved: {moved}"),
        format!("significant: {}", diff.is_significant()),
        format!("accepted: {accepted}"),
    ]
}
