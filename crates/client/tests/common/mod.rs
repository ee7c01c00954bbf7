//! In-memory cluster shared by the client integration tests.
//!
//! One `FakeCluster` plays every seam at once: it serves configurations,
//! opens node connections that answer according to the cluster's own
//! topology (not the client's), and serves view rows.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use client::{
    Client, ClientIo, ConnectionError, ConnectionFactory, NodeConnection, Operation, Request,
    Response, RowStream, Settings, ViewQuery, ViewTransport,
};
use corelib::partitioner::Crc32Hasher;
use corelib::{locate, locate_replica, ClusterConfig, Node, Partition};
use durability::{ObserveReply, ObserveStatus};
use futures::StreamExt;
use parking_lot::Mutex;
use provider::{ConfigSource, ConfigurationProvider, Credentials, Endpoint, FetchError, ProviderSettings};

pub fn node(host: &str) -> Node {
    Node::new(host, 11210, 8092)
}

/// Partitioned config where `owner(p)` owns partition `p` of 8 and every
/// partition has the same replica nodes.
pub fn config_with(
    revision: u64,
    hosts: &[&str],
    owner: impl Fn(usize) -> Option<usize>,
    replicas: &[usize],
) -> ClusterConfig {
    let nodes = hosts.iter().map(|h| node(h)).collect();
    let partitions = (0..8)
        .map(|p| Partition::new(owner(p), replicas.iter().map(|r| Some(*r)).collect()))
        .collect();
    ClusterConfig::partitioned(revision, nodes, partitions, Arc::new(Crc32Hasher)).unwrap()
}

/// Every partition owned by `hosts[owner]`, no replicas.
pub fn config(revision: u64, hosts: &[&str], owner: usize) -> ClusterConfig {
    config_with(revision, hosts, |_| Some(owner), &[])
}

pub fn settings() -> Settings {
    Settings::new(
        ProviderSettings::new(["seed:8091"])
            .with_bucket("default")
            .with_credentials(Credentials::new("app", "secret")),
    )
    .with_max_retries(3)
}

#[derive(Default)]
pub struct State {
    /// What the nodes believe.
    pub topology: Mutex<Option<ClusterConfig>>,
    /// What the configuration source serves, when it differs.
    pub served: Mutex<Option<ClusterConfig>>,
    pub piggyback: AtomicBool,
    pub config_unreachable: AtomicBool,
    pub down: Mutex<HashSet<String>>,
    pub hang: Mutex<HashSet<String>>,
    /// Overrides the observe answer of every node.
    pub observe: Mutex<Option<ObserveReply>>,
    store: Mutex<HashMap<Bytes, (Bytes, u64)>>,
    next_cas: AtomicU64,
    pub sent: Mutex<Vec<(String, &'static str)>>,
    pub fetches: Mutex<Vec<String>>,
    pub closed: Mutex<Vec<String>>,
    pub queried: Mutex<Vec<String>>,
}

#[derive(Clone, Default)]
pub struct FakeCluster(Arc<State>);

impl Deref for FakeCluster {
    type Target = State;

    fn deref(&self) -> &State {
        &self.0
    }
}

impl FakeCluster {
    pub fn new(topology: ClusterConfig) -> Self {
        let cluster = Self::default();
        cluster.set_topology(topology);
        cluster
    }

    pub fn set_topology(&self, topology: ClusterConfig) {
        *self.topology.lock() = Some(topology);
    }

    pub fn topology(&self) -> ClusterConfig {
        self.topology.lock().clone().expect("topology set")
    }

    pub fn io(&self) -> ClientIo {
        ClientIo {
            config_source: Arc::new(self.clone()),
            connections: Arc::new(self.clone()),
            views: Arc::new(self.clone()),
        }
    }

    /// Client whose provider starts from `view` instead of bootstrapping.
    pub fn client(&self, settings: Settings, view: ClusterConfig) -> Client {
        let provider =
            ConfigurationProvider::with_config(settings.provider.clone(), Arc::new(self.clone()), view);
        Client::with_provider(settings, provider, Arc::new(self.clone()), Arc::new(self.clone()))
    }

    /// Number of `op` requests `host` received.
    pub fn sends(&self, host: &str, op: &str) -> usize {
        self.sent
            .lock()
            .iter()
            .filter(|(h, o)| h == host && *o == op)
            .count()
    }

    pub fn fetches(&self) -> Vec<String> {
        self.fetches.lock().clone()
    }

    fn observe(&self, key: &[u8]) -> ObserveReply {
        if let Some(reply) = *self.observe.lock() {
            return reply;
        }
        match self.store.lock().get(key) {
            Some((_, cas)) => ObserveReply::new(ObserveStatus::FoundPersisted, *cas),
            None => ObserveReply::new(ObserveStatus::NotFoundPersisted, 0),
        }
    }

    fn apply(&self, key: Bytes, op: Operation) -> Response {
        if op == Operation::Observe {
            return Response::Observed(self.observe(&key));
        }
        let mut store = self.store.lock();
        let current_cas = store.get(&key).map(|(_, cas)| *cas);
        match op {
            Operation::Get | Operation::GetReplica { .. } => match store.get(&key) {
                Some((value, cas)) => Response::Value {
                    value: value.clone(),
                    cas: *cas,
                },
                None => Response::KeyNotFound,
            },
            Operation::Upsert { value, cas, .. } => {
                if let Some(expected) = cas {
                    match current_cas {
                        None => return Response::KeyNotFound,
                        Some(c) if c != expected => return Response::CasMismatch,
                        Some(_) => {}
                    }
                }
                let cas = self.next_cas.fetch_add(1, Ordering::SeqCst) + 1;
                store.insert(key, (value, cas));
                Response::Stored { cas }
            }
            Operation::Remove { cas } => match current_cas {
                None => Response::KeyNotFound,
                Some(c) if cas.is_some_and(|expected| expected != c) => Response::CasMismatch,
                Some(_) => {
                    store.remove(&key);
                    Response::Removed {
                        cas: self.next_cas.fetch_add(1, Ordering::SeqCst) + 1,
                    }
                }
            },
            Operation::Observe => unreachable!(),
        }
    }
}

#[async_trait]
impl ConfigSource for FakeCluster {
    async fn fetch(
        &self,
        endpoint: &Endpoint,
        _bucket: &str,
        _credentials: &Credentials,
    ) -> Result<ClusterConfig, FetchError> {
        self.fetches.lock().push(endpoint.to_string());
        if self.config_unreachable.load(Ordering::SeqCst) {
            return Err(FetchError::Unreachable("connection refused".into()));
        }
        let served = self.served.lock().clone();
        Ok(served.unwrap_or_else(|| self.topology()))
    }
}

#[async_trait]
impl ConnectionFactory for FakeCluster {
    async fn connect(
        &self,
        node: &Node,
        bucket: &str,
        credentials: &Credentials,
    ) -> Result<Arc<dyn NodeConnection>, ConnectionError> {
        assert_eq!(bucket, "default");
        assert_eq!(credentials.username, "app");
        Ok(Arc::new(FakeConnection {
            node: node.clone(),
            cluster: self.clone(),
        }))
    }
}

struct FakeConnection {
    node: Node,
    cluster: FakeCluster,
}

#[async_trait]
impl NodeConnection for FakeConnection {
    async fn send(&self, request: Request) -> Result<Response, ConnectionError> {
        let host = self.node.host().to_string();
        self.cluster.sent.lock().push((host.clone(), request.op.name()));
        if self.cluster.down.lock().contains(&host) {
            return Err(ConnectionError::Unreachable("connection reset".into()));
        }
        let hang = self.cluster.hang.lock().contains(&host);
        if hang {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }

        let topology = self.cluster.topology();
        let owner = match &request.op {
            Operation::Observe => Ok(self.node.clone()),
            Operation::GetReplica { index } => locate_replica(&request.key, *index, &topology),
            _ => locate(&request.key, &topology).map(|d| d.target),
        };
        if owner.as_ref() != Ok(&self.node) {
            let piggyback = self.cluster.piggyback.load(Ordering::SeqCst);
            return Ok(Response::NotMyPartition {
                config: piggyback.then_some(topology),
            });
        }
        Ok(self.cluster.apply(request.key, request.op))
    }

    async fn close(&self) {
        self.cluster.closed.lock().push(self.node.host().to_string());
    }
}

#[async_trait]
impl ViewTransport for FakeCluster {
    async fn execute(&self, host: &Node, _query: &ViewQuery) -> Result<RowStream, ConnectionError> {
        self.queried.lock().push(host.host().to_string());
        if self.down.lock().contains(host.host()) {
            return Err(ConnectionError::Unreachable("connection refused".into()));
        }
        let row = Bytes::from(host.host().to_string());
        Ok(futures::stream::iter(vec![Ok(row)]).boxed())
    }
}
