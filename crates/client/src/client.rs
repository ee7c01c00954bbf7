//! The application-facing facade.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use durability::{DurabilityReport, DurabilityRequirement, DurabilityTracker, Mutation};
use provider::{ConfigSource, ConfigurationProvider};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::connection::{ConnectionFactory, Operation, Response};
use crate::error::{ClientError, Result};
use crate::observer::RouterObserver;
use crate::pool::{RowStream, ViewConnectionPool, ViewQuery, ViewTransport};
use crate::router::{RequestRouter, Target};
use crate::settings::Settings;

/// The I/O seams a client runs on.
pub struct ClientIo {
    pub config_source: Arc<dyn ConfigSource>,
    pub connections: Arc<dyn ConnectionFactory>,
    pub views: Arc<dyn ViewTransport>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub key: Bytes,
    pub value: Bytes,
    pub cas: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutationResult {
    pub cas: u64,
    /// Present when a durability requirement was checked.
    pub durability: Option<DurabilityReport>,
}

#[derive(Debug, Clone, Default)]
pub struct PutOptions {
    /// Only replace the stored value if it still carries this CAS.
    pub cas: Option<u64>,
    /// Expiry in seconds, 0 for none.
    pub expiry: u32,
    /// Overrides the default requirement from [`Settings`].
    pub durability: Option<DurabilityRequirement>,
    /// Deadline for the write and, separately, for its durability check.
    /// Defaults to `operation_timeout`.
    pub timeout: Option<Duration>,
}

impl PutOptions {
    pub fn with_cas(mut self, cas: u64) -> Self {
        self.cas = Some(cas);
        self
    }

    pub fn with_expiry(mut self, expiry: u32) -> Self {
        self.expiry = expiry;
        self
    }

    pub fn with_durability(mut self, requirement: DurabilityRequirement) -> Self {
        self.durability = Some(requirement);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct RemoveOptions {
    pub cas: Option<u64>,
    pub durability: Option<DurabilityRequirement>,
    pub timeout: Option<Duration>,
}

impl RemoveOptions {
    pub fn with_cas(mut self, cas: u64) -> Self {
        self.cas = Some(cas);
        self
    }

    pub fn with_durability(mut self, requirement: DurabilityRequirement) -> Self {
        self.durability = Some(requirement);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Options of reads and view queries.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadOptions {
    /// Defaults to `operation_timeout`.
    pub timeout: Option<Duration>,
}

impl ReadOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Keyed reads and writes, replica reads and view queries against one
/// bucket.
pub struct Client {
    settings: Settings,
    provider: Arc<ConfigurationProvider>,
    router: Arc<RequestRouter>,
    views: ViewConnectionPool,
    tracker: Arc<DurabilityTracker>,
    closed: AtomicBool,
    inflight: InFlight,
    abort: CancellationToken,
}

impl Client {
    /// Bootstrap the configuration from the seeds and start following it.
    pub async fn connect(settings: Settings, io: ClientIo) -> Result<Self> {
        settings.validate()?;
        let provider =
            ConfigurationProvider::bootstrap(settings.provider.clone(), io.config_source).await?;
        provider.start();
        Ok(Self::with_provider(settings, provider, io.connections, io.views))
    }

    /// Client on an already bootstrapped provider.
    pub fn with_provider(
        settings: Settings,
        provider: Arc<ConfigurationProvider>,
        connections: Arc<dyn ConnectionFactory>,
        views: Arc<dyn ViewTransport>,
    ) -> Self {
        let router = Arc::new(RequestRouter::new(
            Arc::clone(&provider),
            connections,
            &settings,
        ));
        let tracker = Arc::new(DurabilityTracker::new(
            Arc::new(RouterObserver::new(Arc::clone(&router))),
            settings.observe(),
        ));
        let views = ViewConnectionPool::new(views);
        views.sync_with(&provider.current());
        Self {
            settings,
            provider,
            router,
            views,
            tracker,
            closed: AtomicBool::new(false),
            inflight: InFlight::default(),
            abort: CancellationToken::new(),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn provider(&self) -> &Arc<ConfigurationProvider> {
        &self.provider
    }

    pub fn router(&self) -> &Arc<RequestRouter> {
        &self.router
    }

    pub fn views(&self) -> &ViewConnectionPool {
        &self.views
    }

    pub async fn get(&self, key: impl Into<Bytes>) -> Result<Document> {
        self.get_with(key, ReadOptions::default()).await
    }

    pub async fn get_with(&self, key: impl Into<Bytes>, options: ReadOptions) -> Result<Document> {
        let key = key.into();
        self.run(async move {
            let response = self
                .router
                .route(key.clone(), Operation::Get, Target::Active, options.timeout)
                .await?;
            document(key, response)
        })
        .await
    }

    /// Read the copy held by replica slot `index` (0-based).
    pub async fn get_replica(&self, key: impl Into<Bytes>, index: usize) -> Result<Document> {
        self.get_replica_with(key, index, ReadOptions::default())
            .await
    }

    pub async fn get_replica_with(
        &self,
        key: impl Into<Bytes>,
        index: usize,
        options: ReadOptions,
    ) -> Result<Document> {
        let key = key.into();
        self.run(async move {
            let response = self
                .router
                .route(
                    key.clone(),
                    Operation::GetReplica { index },
                    Target::Replica(index),
                    options.timeout,
                )
                .await?;
            document(key, response)
        })
        .await
    }

    /// Store `value` under `key`, then wait for the requested durability.
    pub async fn put(
        &self,
        key: impl Into<Bytes>,
        value: impl Into<Bytes>,
        options: PutOptions,
    ) -> Result<MutationResult> {
        let key = key.into();
        let op = Operation::Upsert {
            value: value.into(),
            cas: options.cas,
            expiry: options.expiry,
        };
        let requirement = options
            .durability
            .unwrap_or(self.settings.default_durability);
        self.run(async move {
            match self
                .router
                .route(key.clone(), op, Target::Active, options.timeout)
                .await?
            {
                Response::Stored { cas } => {
                    self.confirm(Mutation::store(key, cas), requirement, options.timeout)
                        .await
                }
                other => Err(failure(other)),
            }
        })
        .await
    }

    pub async fn remove(
        &self,
        key: impl Into<Bytes>,
        options: RemoveOptions,
    ) -> Result<MutationResult> {
        let key = key.into();
        let op = Operation::Remove { cas: options.cas };
        let requirement = options
            .durability
            .unwrap_or(self.settings.default_durability);
        self.run(async move {
            match self
                .router
                .route(key.clone(), op, Target::Active, options.timeout)
                .await?
            {
                Response::Removed { cas } => {
                    self.confirm(Mutation::remove(key, cas), requirement, options.timeout)
                        .await
                }
                other => Err(failure(other)),
            }
        })
        .await
    }

    /// Run a view query on the next host in rotation.
    pub async fn query(&self, query: &ViewQuery) -> Result<RowStream> {
        self.query_with(query, ReadOptions::default()).await
    }

    /// Like [`query`](Self::query); the timeout bounds getting the row
    /// stream, not draining it.
    pub async fn query_with(&self, query: &ViewQuery, options: ReadOptions) -> Result<RowStream> {
        let after = options.timeout.unwrap_or(self.settings.operation_timeout);
        self.run(async move {
            self.views.sync_with(&self.provider.current());
            match tokio::time::timeout(after, self.views.query(query)).await {
                Ok(rows) => Ok(rows?),
                Err(_) => Err(ClientError::Timeout { after }),
            }
        })
        .await
    }

    /// Stop accepting operations, cancel durability polls and give in-flight
    /// operations `shutdown_grace` to finish before aborting them.
    pub async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("client shutting down");
        self.tracker.close();

        let grace = self.settings.shutdown_grace;
        if tokio::time::timeout(grace, self.inflight.drained())
            .await
            .is_err()
        {
            warn!(
                remaining = self.inflight.count.load(Ordering::SeqCst),
                ?grace,
                "grace period elapsed, aborting in-flight operations"
            );
        }
        self.abort.cancel();

        self.provider.shutdown().await;
        self.router.close().await;
        self.views.shutdown().await;
        info!("client shut down");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn confirm(
        &self,
        mutation: Mutation,
        requirement: DurabilityRequirement,
        timeout: Option<Duration>,
    ) -> Result<MutationResult> {
        let cas = mutation.cas;
        if requirement.is_none() {
            return Ok(MutationResult {
                cas,
                durability: None,
            });
        }
        let config = self.provider.current();
        let report = self
            .tracker
            .await_durability(
                &mutation,
                requirement,
                &config,
                timeout.unwrap_or(self.settings.operation_timeout),
            )
            .await?;
        Ok(MutationResult {
            cas,
            durability: Some(report),
        })
    }

    async fn run<T, F>(&self, operation: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let _guard = self.enter()?;
        tokio::select! {
            biased;
            _ = self.abort.cancelled() => Err(ClientError::Shutdown),
            result = operation => result,
        }
    }

    fn enter(&self) -> Result<InFlightGuard<'_>> {
        // Register before checking the flag so shutdown never misses us.
        self.inflight.count.fetch_add(1, Ordering::SeqCst);
        let guard = InFlightGuard(&self.inflight);
        if self.is_closed() {
            return Err(ClientError::Shutdown);
        }
        Ok(guard)
    }
}

fn document(key: Bytes, response: Response) -> Result<Document> {
    match response {
        Response::Value { value, cas } => Ok(Document { key, value, cas }),
        other => Err(failure(other)),
    }
}

fn failure(response: Response) -> ClientError {
    match response {
        Response::KeyNotFound => ClientError::KeyNotFound,
        Response::CasMismatch => ClientError::CasMismatch,
        other => ClientError::UnexpectedResponse(format!("{other:?}")),
    }
}

#[derive(Default)]
struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

impl InFlight {
    async fn drained(&self) {
        loop {
            let notified = self.idle.notified();
            if self.count.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

struct InFlightGuard<'a>(&'a InFlight);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if self.0.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}
