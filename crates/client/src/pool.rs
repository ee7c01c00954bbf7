//! Round-robin pool of view (query) hosts.
//!
//! Query traffic is not keyed, so any node that currently owns at least one
//! active partition can serve it. The pool keeps those nodes in a stable
//! order and hands them out in turn. When a new topology arrives the host
//! set is reconciled rather than rebuilt: survivors keep their relative
//! order, newcomers are appended and departed hosts are removed, so the
//! rotation carries on where it was.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use corelib::{ClusterConfig, Node};
use futures::stream::BoxStream;
use metrics::counter;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::connection::ConnectionError;
use crate::error::PoolError;

/// Rows of a view response, one opaque JSON row per item.
pub type RowStream = BoxStream<'static, Result<Bytes, ConnectionError>>;

/// An already serialized view query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewQuery {
    /// Path and query string, e.g. `/_design/beer/_view/by_name?limit=10`.
    pub path: String,
    pub body: Option<Bytes>,
}

impl ViewQuery {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            body: None,
        }
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// Transport seam for view queries.
#[async_trait]
pub trait ViewTransport: Send + Sync + 'static {
    async fn execute(&self, host: &Node, query: &ViewQuery) -> Result<RowStream, ConnectionError>;

    /// Release whatever the transport holds for `host`.
    async fn release(&self, _host: &Node) {}
}

#[derive(Debug, Default)]
struct HostSet {
    hosts: Vec<Node>,
    /// Index of the host handed out next.
    cursor: usize,
    /// Configuration last synced from.
    synced: Option<Arc<ClusterConfig>>,
    shutdown: bool,
}

pub struct ViewConnectionPool {
    transport: Arc<dyn ViewTransport>,
    state: Mutex<HostSet>,
}

impl ViewConnectionPool {
    pub fn new(transport: Arc<dyn ViewTransport>) -> Self {
        Self {
            transport,
            state: Mutex::new(HostSet::default()),
        }
    }

    /// Pool seeded with bootstrap hosts, in the given order.
    pub fn with_hosts(transport: Arc<dyn ViewTransport>, hosts: Vec<Node>) -> Self {
        Self {
            transport,
            state: Mutex::new(HostSet {
                hosts,
                ..HostSet::default()
            }),
        }
    }

    /// Next host in rotation.
    ///
    /// Never waits: an empty pool fails with
    /// [`PoolError::NoHostsAvailable`] straight away.
    pub fn next_host(&self) -> Result<Node, PoolError> {
        let mut state = self.state.lock();
        if state.shutdown {
            return Err(PoolError::PoolShutdown);
        }
        if state.hosts.is_empty() {
            return Err(PoolError::NoHostsAvailable);
        }
        let index = state.cursor % state.hosts.len();
        state.cursor = (index + 1) % state.hosts.len();
        Ok(state.hosts[index].clone())
    }

    /// Current host set in rotation order.
    pub fn hosts(&self) -> Vec<Node> {
        self.state.lock().hosts.clone()
    }

    /// Reconcile the host set against `candidates`, keeping only those for
    /// which `is_active` holds. Applying the same input twice changes
    /// nothing the second time. Returns the hosts that left the set.
    pub fn reconcile<F>(&self, candidates: &[Node], is_active: F) -> Vec<Node>
    where
        F: Fn(&Node) -> bool,
    {
        let eligible: Vec<&Node> = candidates.iter().filter(|n| is_active(n)).collect();
        let mut state = self.state.lock();
        if state.shutdown {
            return Vec::new();
        }
        Self::apply(&mut state, &eligible)
    }

    /// Reconcile against `config` unless this snapshot was already applied
    /// or an older one is offered. A reinstalled snapshot of the same
    /// revision is applied again.
    pub fn sync_with(&self, config: &Arc<ClusterConfig>) {
        let removed = {
            let mut state = self.state.lock();
            if state.shutdown {
                return;
            }
            if let Some(last) = &state.synced {
                if Arc::ptr_eq(last, config) || last.revision() > config.revision() {
                    return;
                }
            }
            state.synced = Some(Arc::clone(config));
            let eligible: Vec<&Node> = config.nodes_with_active_partitions().collect();
            Self::apply(&mut state, &eligible)
        };
        self.release(removed);
    }

    /// Run `query` on the next host.
    pub async fn query(&self, query: &ViewQuery) -> Result<RowStream, PoolError> {
        let host = self.next_host()?;
        debug!(%host, path = %query.path, "dispatching view query");
        self.transport
            .execute(&host, query)
            .await
            .map_err(|source| PoolError::Transport { host, source })
    }

    /// Drop every host; later calls fail with [`PoolError::PoolShutdown`].
    pub async fn shutdown(&self) {
        let hosts = {
            let mut state = self.state.lock();
            if state.shutdown {
                return;
            }
            state.shutdown = true;
            state.cursor = 0;
            std::mem::take(&mut state.hosts)
        };
        for host in &hosts {
            self.transport.release(host).await;
        }
        info!(released = hosts.len(), "view pool shut down");
    }

    pub fn is_shutdown(&self) -> bool {
        self.state.lock().shutdown
    }

    fn apply(state: &mut HostSet, eligible: &[&Node]) -> Vec<Node> {
        let mut removed = Vec::new();
        let mut removed_before_cursor = 0;
        let mut kept = Vec::with_capacity(eligible.len());
        for (i, host) in std::mem::take(&mut state.hosts).into_iter().enumerate() {
            if eligible.contains(&&host) {
                kept.push(host);
            } else {
                if i < state.cursor {
                    removed_before_cursor += 1;
                }
                removed.push(host);
            }
        }
        let mut added = 0;
        for host in eligible {
            if !kept.contains(*host) {
                kept.push((*host).clone());
                added += 1;
            }
        }

        state.cursor = if kept.is_empty() {
            0
        } else {
            (state.cursor - removed_before_cursor) % kept.len()
        };
        state.hosts = kept;

        if added > 0 || !removed.is_empty() {
            counter!("view_pool.reconciled").increment(1);
            info!(
                added,
                removed = removed.len(),
                hosts = state.hosts.len(),
                "view hosts reconciled"
            );
        }
        removed
    }

    fn release(&self, removed: Vec<Node>) {
        for host in removed {
            let transport = Arc::clone(&self.transport);
            tokio::spawn(async move { transport.release(&host).await });
        }
    }
}
