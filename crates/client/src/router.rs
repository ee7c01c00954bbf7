//! Keyed request dispatch.
//!
//! Every attempt re-reads the provider's current snapshot, locates the key
//! and sends on the owning node's connection. No lock is held while waiting
//! on the network, so a slow node never delays routing for other keys or
//! the installation of a new configuration.
//!
//! # Rerouting
//!
//! - *Ownership mismatch*: the node says it does not own the partition. A
//!   configuration attached to the response is offered to the provider; if
//!   that did not advance the topology a forced refresh follows. Every
//!   mismatch also counts towards the provider's reconnect threshold, and
//!   crossing it turns the refresh into a full reconnect from the seeds.
//! - *No active owner*: the partition is mid-failover. Force a refresh
//!   and, unless it brought a newer revision, wait `no_owner_backoff`
//!   before resolving again.
//! - *Node unreachable*: drop the connection, refresh and resolve again.
//!
//! All three share one retry budget per operation, and the whole operation
//! runs under the caller's timeout, `operation_timeout` by default.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use bytes::Bytes;
use corelib::{locate, locate_replica, partition_for, ClusterConfig, Node};
use dashmap::DashMap;
use metrics::counter;
use provider::{ConfigurationProvider, ProviderError};
use tracing::{debug, info, warn};

use crate::connection::{ConnectionFactory, NodeConnection, Operation, Request, Response};
use crate::error::{ClientError, Result};
use crate::settings::Settings;

/// Which copy of a key an operation addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Active,
    /// Replica slot, 0-based.
    Replica(usize),
}

pub struct RequestRouter {
    provider: Arc<ConfigurationProvider>,
    factory: Arc<dyn ConnectionFactory>,
    connections: DashMap<Node, Arc<dyn NodeConnection>>,
    /// Snapshot the connection table was last pruned against.
    pruned: ArcSwapOption<ClusterConfig>,
    max_retries: u32,
    no_owner_backoff: Duration,
    operation_timeout: Duration,
    closed: AtomicBool,
}

impl RequestRouter {
    pub fn new(
        provider: Arc<ConfigurationProvider>,
        factory: Arc<dyn ConnectionFactory>,
        settings: &Settings,
    ) -> Self {
        Self {
            provider,
            factory,
            connections: DashMap::new(),
            pruned: ArcSwapOption::empty(),
            max_retries: settings.max_retries,
            no_owner_backoff: settings.no_owner_backoff,
            operation_timeout: settings.operation_timeout,
            closed: AtomicBool::new(false),
        }
    }

    pub fn provider(&self) -> &Arc<ConfigurationProvider> {
        &self.provider
    }

    /// Send `op` for `key` to the node currently owning `target`.
    ///
    /// The whole operation, reroutes included, must finish within
    /// `timeout`, or the router's `operation_timeout` when `None`.
    ///
    /// A reroute resubmits the operation as a new request, so two
    /// operations on the same key may complete out of order across a
    /// topology change.
    pub async fn route(
        &self,
        key: Bytes,
        op: Operation,
        target: Target,
        timeout: Option<Duration>,
    ) -> Result<Response> {
        if self.is_closed() {
            return Err(ClientError::Shutdown);
        }
        let name = op.name();
        let timeout = timeout.unwrap_or(self.operation_timeout);
        match tokio::time::timeout(timeout, self.dispatch(key, op, target)).await {
            Ok(result) => result,
            Err(_) => {
                debug!(op = name, ?timeout, "operation timed out");
                Err(ClientError::Timeout { after: timeout })
            }
        }
    }

    /// Default deadline of [`route`](Self::route).
    pub fn operation_timeout(&self) -> Duration {
        self.operation_timeout
    }

    /// Send a request to one specific node, bypassing key location.
    ///
    /// A connection that fails is dropped so the next request reconnects.
    pub async fn send_to(&self, node: &Node, request: Request) -> Result<Response> {
        let connection = self.connection(node).await?;
        match connection.send(request).await {
            Ok(response) => Ok(response),
            Err(source) => {
                debug!(%node, error = %source, "dropping failed connection");
                self.connections.remove(node);
                Err(ClientError::NodeUnreachable {
                    node: node.clone(),
                    source,
                })
            }
        }
    }

    /// Nodes with an open connection.
    pub fn connected_nodes(&self) -> Vec<Node> {
        let mut nodes: Vec<Node> = self.connections.iter().map(|e| e.key().clone()).collect();
        nodes.sort();
        nodes
    }

    /// Refuse further operations and release every connection.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let nodes = self.connected_nodes();
        for node in nodes {
            if let Some((_, connection)) = self.connections.remove(&node) {
                connection.close().await;
            }
        }
        info!("request router closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn dispatch(&self, key: Bytes, op: Operation, target: Target) -> Result<Response> {
        let mut attempts = 0u32;
        loop {
            if self.is_closed() {
                return Err(ClientError::Shutdown);
            }
            let config = self.provider.current();
            self.prune(&config);

            let (node, partition) = match resolve(&key, target, &config) {
                Ok(route) => route,
                Err(ClientError::Routing(e)) if e.is_retryable() => {
                    attempts += 1;
                    if attempts > self.max_retries {
                        return Err(e.into());
                    }
                    debug!(error = %e, attempts, "no active owner, refreshing");
                    counter!("router.retries").increment(1);
                    tolerate(self.provider.force_refresh().await)?;
                    if self.provider.current().revision() == config.revision() {
                        tokio::time::sleep(self.no_owner_backoff).await;
                    }
                    continue;
                }
                Err(e) => return Err(e),
            };

            let request = Request {
                key: key.clone(),
                partition,
                op: op.clone(),
            };
            match self.send_to(&node, request).await {
                Ok(Response::NotMyPartition { config: pushed }) => {
                    attempts += 1;
                    counter!("router.ownership_mismatch").increment(1);
                    if attempts > self.max_retries {
                        warn!(%node, attempts, "cluster kept redirecting, giving up");
                        return Err(ClientError::OwnershipRetriesExhausted { attempts });
                    }
                    debug!(%node, ?partition, revision = config.revision(), "ownership mismatch, rerouting");
                    self.resync(pushed).await?;
                    counter!("router.retries").increment(1);
                }
                Ok(response) => return Ok(response),
                Err(ClientError::NodeUnreachable { node, source }) => {
                    attempts += 1;
                    if attempts > self.max_retries {
                        return Err(ClientError::NodeUnreachable { node, source });
                    }
                    debug!(%node, error = %source, attempts, "node unreachable, rerouting");
                    counter!("router.retries").increment(1);
                    tolerate(self.provider.force_refresh().await)?;
                    tokio::time::sleep(self.no_owner_backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Bring the topology up to date after an ownership mismatch.
    async fn resync(&self, pushed: Option<ClusterConfig>) -> Result<()> {
        let advanced = pushed.map_or(false, |config| self.provider.accept(config));
        if self.provider.past_reconnect_threshold() {
            warn!("ownership mismatches past threshold, reconnecting from seeds");
            tolerate(self.provider.reconnect().await)
        } else if advanced {
            Ok(())
        } else {
            tolerate(self.provider.force_refresh().await)
        }
    }

    async fn connection(&self, node: &Node) -> Result<Arc<dyn NodeConnection>> {
        if let Some(connection) = self.connections.get(node) {
            return Ok(Arc::clone(connection.value()));
        }
        let settings = self.provider.settings();
        let connection = self
            .factory
            .connect(node, &settings.bucket, &settings.credentials)
            .await
            .map_err(|source| ClientError::NodeUnreachable {
                node: node.clone(),
                source,
            })?;
        debug!(%node, "opened node connection");
        // A concurrent caller may have connected first; keep theirs.
        let entry = self.connections.entry(node.clone()).or_insert(connection);
        Ok(Arc::clone(entry.value()))
    }

    /// Drop connections to nodes that are no longer part of the topology.
    ///
    /// Runs once per installed snapshot, including a reinstalled one of the
    /// same revision; older snapshots are ignored.
    fn prune(&self, config: &Arc<ClusterConfig>) {
        let last = self.pruned.load();
        if let Some(seen) = (*last).as_ref() {
            if Arc::ptr_eq(seen, config) || seen.revision() > config.revision() {
                return;
            }
        }
        let previous = self.pruned.compare_and_swap(&last, Some(Arc::clone(config)));
        let won = match ((*previous).as_ref(), (*last).as_ref()) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };
        if !won {
            return;
        }
        let revision = config.revision();
        let mut departed = Vec::new();
        self.connections.retain(|node, connection| {
            let keep = config.index_of(node).is_some();
            if !keep {
                departed.push((node.clone(), Arc::clone(connection)));
            }
            keep
        });
        for (node, connection) in departed {
            info!(%node, revision, "node left the topology, closing its connection");
            tokio::spawn(async move { connection.close().await });
        }
    }
}

fn resolve(key: &[u8], target: Target, config: &ClusterConfig) -> Result<(Node, Option<u16>)> {
    match target {
        Target::Active => {
            let decision = locate(key, config)?;
            Ok((decision.target, decision.partition))
        }
        Target::Replica(index) => {
            let replicas = config.num_replicas();
            if index >= replicas {
                return Err(ClientError::InvalidReplica { index, replicas });
            }
            let node = locate_replica(key, index, config)?;
            Ok((node, partition_for(key, config)))
        }
    }
}

/// A refresh that reached nobody is not fatal to the operation: it retries
/// against the snapshot it has. Only shutdown ends it.
fn tolerate(result: provider::Result<Arc<ClusterConfig>>) -> Result<()> {
    match result {
        Ok(_) => Ok(()),
        Err(ProviderError::Shutdown) => Err(ClientError::Shutdown),
        Err(e) => {
            warn!(error = %e, "configuration refresh failed, retrying on current snapshot");
            Ok(())
        }
    }
}
