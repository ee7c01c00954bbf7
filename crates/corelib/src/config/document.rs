//! Decoding of the JSON bucket description.

use serde::Deserialize;
use tracing::debug;

use super::ClusterConfig;
use crate::error::{Error, Result};
use crate::node::{split_host_port, Node, DEFAULT_VIEW_PORT};
use crate::partition::{Partition, MAX_REPLICAS};
use crate::partitioner;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BucketDocument {
    #[serde(default)]
    rev: u64,
    #[serde(default)]
    name: String,
    node_locator: Option<String>,
    #[serde(default)]
    nodes: Vec<NodeDocument>,
    v_bucket_server_map: Option<ServerMapDocument>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeDocument {
    hostname: String,
    ports: PortsDocument,
    couch_api_base: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PortsDocument {
    direct: u16,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerMapDocument {
    hash_algorithm: String,
    num_replicas: usize,
    server_list: Vec<String>,
    v_bucket_map: Vec<Vec<i32>>,
}

impl NodeDocument {
    fn host(&self) -> Result<&str> {
        // "hostname" is the REST address; the port may be absent.
        match split_host_port(&self.hostname) {
            Ok((host, _)) => Ok(host),
            Err(_) if !self.hostname.is_empty() => Ok(&self.hostname),
            Err(e) => Err(e),
        }
    }

    fn view_port(&self) -> u16 {
        self.couch_api_base
            .as_deref()
            .and_then(authority_port)
            .unwrap_or(DEFAULT_VIEW_PORT)
    }
}

/// Port of `scheme://host:port/path`, if present.
fn authority_port(url: &str) -> Option<u16> {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    let authority = rest.split('/').next()?;
    authority.rsplit_once(':')?.1.parse().ok()
}

pub(super) fn parse(json: &str) -> Result<ClusterConfig> {
    let doc: BucketDocument = serde_json::from_str(json)?;
    let ketama = doc
        .node_locator
        .as_deref()
        .is_some_and(|l| l.eq_ignore_ascii_case("ketama"));

    let config = match (&doc.v_bucket_server_map, ketama) {
        (Some(map), false) => parse_partitioned(&doc, map)?,
        _ => parse_unpartitioned(&doc)?,
    };
    debug!(
        revision = config.revision(),
        bucket = %doc.name,
        nodes = config.nodes().len(),
        "decoded cluster configuration"
    );
    Ok(config.with_bucket(doc.name))
}

fn parse_partitioned(doc: &BucketDocument, map: &ServerMapDocument) -> Result<ClusterConfig> {
    let hasher = partitioner::lookup(&map.hash_algorithm)
        .ok_or_else(|| Error::UnknownHashAlgorithm(map.hash_algorithm.clone()))?;
    if map.num_replicas > MAX_REPLICAS {
        return Err(Error::InvalidConfig(format!(
            "expected number <= {MAX_REPLICAS} for replicas (got {})",
            map.num_replicas
        )));
    }
    if map.server_list.is_empty() {
        return Err(Error::InvalidConfig("empty servers list".into()));
    }

    let mut nodes = Vec::with_capacity(map.server_list.len());
    for server in &map.server_list {
        let (host, port) = split_host_port(server)?;
        nodes.push(Node::new(host, port, view_port_of(doc, host, port)?));
    }

    let partitions = map
        .v_bucket_map
        .iter()
        .map(|entry| Partition::from_wire(entry))
        .collect();
    Ok(ClusterConfig::partitioned(doc.rev, nodes, partitions, hasher)?
        .with_num_replicas(map.num_replicas))
}

/// View port of the data address `host:port`. Several nodes may share a
/// host, so the data port decides; a host-only match is the fallback.
fn view_port_of(doc: &BucketDocument, host: &str, port: u16) -> Result<u16> {
    let mut same_host = None;
    for n in &doc.nodes {
        if n.host()? != host {
            continue;
        }
        if n.ports.direct == port {
            return Ok(n.view_port());
        }
        same_host.get_or_insert(n.view_port());
    }
    Ok(same_host.unwrap_or(DEFAULT_VIEW_PORT))
}

fn parse_unpartitioned(doc: &BucketDocument) -> Result<ClusterConfig> {
    if doc.nodes.is_empty() {
        return Err(Error::InvalidConfig("empty nodes list".into()));
    }
    let nodes = doc
        .nodes
        .iter()
        .map(|n| Ok(Node::new(n.host()?, n.ports.direct, n.view_port())))
        .collect::<Result<Vec<_>>>()?;
    ClusterConfig::unpartitioned(doc.rev, nodes)
}
