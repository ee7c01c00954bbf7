//! The single source of topology truth.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::{ArcSwap, Guard};
use corelib::ClusterConfig;
use metrics::counter;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{EndpointFailure, ProviderError, Result};
use crate::gate::ReconnectGate;
use crate::refresh;
use crate::settings::ProviderSettings;
use crate::source::{ConfigSource, Endpoint};

/// Owns the current [`ClusterConfig`] and keeps it fresh.
///
/// Readers call [`current`](Self::current), which is a lock-free load of an
/// atomically swapped `Arc`; they never wait on a refresh. Writers build a
/// whole new snapshot and swap it in only if its revision is newer.
pub struct ConfigurationProvider {
    settings: ProviderSettings,
    source: Arc<dyn ConfigSource>,
    current: ArcSwap<ClusterConfig>,
    gate: ReconnectGate,
    /// Serializes out-of-band fetches so concurrent callers share one.
    refresh_lock: tokio::sync::Mutex<()>,
    closed: AtomicBool,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ConfigurationProvider {
    /// Fetch the first configuration, trying every seed in order.
    ///
    /// Fails with [`ProviderError::ClusterUnreachable`], listing every seed
    /// and its failure, when no seed delivers a configuration.
    pub async fn bootstrap(
        settings: ProviderSettings,
        source: Arc<dyn ConfigSource>,
    ) -> Result<Arc<Self>> {
        settings.validate()?;
        let mut failures = Vec::new();
        for seed in &settings.seeds {
            let endpoint = Endpoint::Seed(seed.clone());
            match source
                .fetch(&endpoint, &settings.bucket, &settings.credentials)
                .await
            {
                Ok(config) => {
                    info!(
                        %endpoint,
                        revision = config.revision(),
                        nodes = config.nodes().len(),
                        "bootstrapped cluster configuration"
                    );
                    return Ok(Self::with_config(settings, source, config));
                }
                Err(e) => {
                    warn!(%endpoint, error = %e, "seed did not deliver a configuration");
                    failures.push(EndpointFailure {
                        endpoint: endpoint.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        Err(ProviderError::ClusterUnreachable { failures })
    }

    /// Provider seeded with an already known configuration.
    pub fn with_config(
        settings: ProviderSettings,
        source: Arc<dyn ConfigSource>,
        config: ClusterConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            gate: ReconnectGate::new(settings.max_config_check, settings.reconnect_window),
            settings,
            source,
            current: ArcSwap::from_pointee(config),
            refresh_lock: tokio::sync::Mutex::new(()),
            closed: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
        })
    }

    pub fn settings(&self) -> &ProviderSettings {
        &self.settings
    }

    /// Latest accepted snapshot. Never blocks.
    pub fn current(&self) -> Arc<ClusterConfig> {
        self.current.load_full()
    }

    /// Offer a configuration (pushed with a response, streamed, or fetched).
    ///
    /// Only a strictly newer revision replaces the current snapshot; older
    /// and equal revisions are dropped silently since re-delivery is normal.
    /// Returns whether the snapshot was replaced.
    pub fn accept(&self, config: ClusterConfig) -> bool {
        self.install(Arc::new(config), false)
    }

    /// Record one ownership-mismatch style event; `true` means the caller
    /// should escalate to [`reconnect`](Self::reconnect).
    pub fn past_reconnect_threshold(&self) -> bool {
        self.gate.hit()
    }

    /// Fetch a fresh configuration out of band, asking the nodes of the
    /// current topology first and the seed list after them.
    ///
    /// Concurrent callers are coalesced: whoever waited on an in-flight
    /// refresh that advanced the revision gets that result without fetching
    /// again. A forced fetch may re-install an identical revision.
    pub async fn force_refresh(&self) -> Result<Arc<ClusterConfig>> {
        self.refresh_with(|_| self.known_endpoints(), true).await
    }

    /// Re-establish the configuration from the seed list alone.
    pub async fn reconnect(&self) -> Result<Arc<ClusterConfig>> {
        info!("reconnecting configuration from seed list");
        self.refresh_with(|_| self.seed_endpoints().collect(), true)
            .await
    }

    /// Start the background refresh task. Calling it twice is harmless.
    pub fn start(self: &Arc<Self>) {
        let mut task = self.task.lock();
        if task.is_some() || self.is_closed() {
            return;
        }
        *task = Some(tokio::spawn(refresh::run(
            Arc::downgrade(self),
            self.cancel.clone(),
            self.settings.refresh_interval,
        )));
    }

    /// Stop the refresh task and refuse further refreshes.
    pub async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cancel.cancel();
        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    warn!(error = %e, "configuration refresh task failed");
                }
            }
        }
        info!("configuration provider shut down");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn source(&self) -> &dyn ConfigSource {
        self.source.as_ref()
    }

    /// Nodes of the current topology followed by the seeds.
    pub(crate) fn known_endpoints(&self) -> Vec<Endpoint> {
        self.current()
            .nodes()
            .iter()
            .cloned()
            .map(Endpoint::Node)
            .chain(self.seed_endpoints())
            .collect()
    }

    /// One background poll: first endpoint that answers wins, strict accept.
    pub(crate) async fn poll_once(&self) -> Result<()> {
        let _guard = self.refresh_lock.lock().await;
        let config = self.fetch_first(&self.known_endpoints()).await?;
        self.accept(config);
        Ok(())
    }

    fn seed_endpoints(&self) -> impl Iterator<Item = Endpoint> + '_ {
        self.settings.seeds.iter().cloned().map(Endpoint::Seed)
    }

    async fn refresh_with<F>(&self, endpoints: F, allow_equal: bool) -> Result<Arc<ClusterConfig>>
    where
        F: FnOnce(&ClusterConfig) -> Vec<Endpoint>,
    {
        if self.is_closed() {
            return Err(ProviderError::Shutdown);
        }
        let seen = self.current().revision();
        let _guard = self.refresh_lock.lock().await;

        let current = self.current();
        if current.revision() > seen {
            debug!(
                revision = current.revision(),
                "refresh coalesced with one already completed"
            );
            return Ok(current);
        }

        counter!("provider.refresh.forced").increment(1);
        let config = self.fetch_first(&endpoints(&current)).await?;
        self.install(Arc::new(config), allow_equal);
        Ok(self.current())
    }

    async fn fetch_first(&self, endpoints: &[Endpoint]) -> Result<ClusterConfig> {
        let mut failures = Vec::new();
        for endpoint in endpoints {
            match self
                .source
                .fetch(endpoint, &self.settings.bucket, &self.settings.credentials)
                .await
            {
                Ok(config) => return Ok(config),
                Err(e) => {
                    debug!(%endpoint, error = %e, "configuration fetch failed");
                    failures.push(EndpointFailure {
                        endpoint: endpoint.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        warn!(attempts = failures.len(), "no endpoint delivered a configuration");
        Err(ProviderError::ClusterUnreachable { failures })
    }

    fn install(&self, candidate: Arc<ClusterConfig>, allow_equal: bool) -> bool {
        let mut current = self.current.load_full();
        loop {
            let newer = candidate.revision() > current.revision()
                || (allow_equal && candidate.revision() == current.revision());
            if !newer {
                debug!(
                    offered = candidate.revision(),
                    current = current.revision(),
                    "ignoring stale configuration"
                );
                counter!("provider.config.stale").increment(1);
                return false;
            }

            let previous = self
                .current
                .compare_and_swap(&current, Arc::clone(&candidate));
            if Arc::ptr_eq(&*previous, &current) {
                let diff = current.diff(&candidate);
                info!(
                    from = current.revision(),
                    to = candidate.revision(),
                    sequence_changed = diff.sequence_changed,
                    partition_changes = ?diff.partition_changes,
                    "installed cluster configuration"
                );
                counter!("provider.config.accepted").increment(1);
                return true;
            }
            // Lost a race with another writer; re-check against its snapshot.
            current = Guard::into_inner(previous);
        }
    }
}

impl Drop for ConfigurationProvider {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
