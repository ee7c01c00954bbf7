//! The observe poll loop.

use std::sync::Arc;
use std::time::Duration;

use corelib::{locate, BucketKind, ClusterConfig, Node};
use futures::future::join_all;
use metrics::counter;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{DurabilityError, Result};
use crate::observe::{Mutation, Observer, Tally};
use crate::requirement::DurabilityRequirement;

/// Poll pacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObserveSettings {
    /// Pause after the first round.
    pub interval: Duration,
    /// Upper bound the pause doubles towards.
    pub max_interval: Duration,
}

impl Default for ObserveSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(10),
            max_interval: Duration::from_millis(100),
        }
    }
}

/// What a successful check saw on its final round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DurabilityReport {
    pub persisted: usize,
    pub replicated: usize,
    /// Observe rounds issued; zero when nothing had to be checked.
    pub rounds: u32,
}

/// Turns an acknowledged write into a durability-checked one.
///
/// Every check is independent: concurrent checks for different keys never
/// wait on each other, and the observe requests of one round go out
/// concurrently. All checks hang off one cancellation token, so
/// [`close`](Self::close) stops every poll still running.
pub struct DurabilityTracker {
    observer: Arc<dyn Observer>,
    settings: ObserveSettings,
    cancel: CancellationToken,
}

impl DurabilityTracker {
    pub fn new(observer: Arc<dyn Observer>, settings: ObserveSettings) -> Self {
        Self {
            observer,
            settings,
            cancel: CancellationToken::new(),
        }
    }

    /// Poll until `mutation` meets `requirement` on the topology of
    /// `config`, or `timeout` elapses.
    ///
    /// An unsatisfiable requirement fails with
    /// [`DurabilityError::InsufficientTopology`] before any request is sent.
    pub async fn await_durability(
        &self,
        mutation: &Mutation,
        requirement: DurabilityRequirement,
        config: &ClusterConfig,
        timeout: Duration,
    ) -> Result<DurabilityReport> {
        self.run(
            mutation,
            requirement,
            config,
            timeout,
            self.cancel.child_token(),
        )
        .await
    }

    /// Run a check as its own task. Dropping the handle cancels it.
    pub fn spawn(
        self: &Arc<Self>,
        mutation: Mutation,
        requirement: DurabilityRequirement,
        config: Arc<ClusterConfig>,
        timeout: Duration,
    ) -> DurabilityHandle {
        let cancel = self.cancel.child_token();
        let tracker = Arc::clone(self);
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            tracker
                .run(&mutation, requirement, &config, timeout, token)
                .await
        });
        DurabilityHandle {
            task: Some(task),
            cancel,
        }
    }

    /// Cancel every running check and refuse new ones.
    pub fn close(&self) {
        if !self.cancel.is_cancelled() {
            info!("durability tracker closed");
        }
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    async fn run(
        &self,
        mutation: &Mutation,
        requirement: DurabilityRequirement,
        config: &ClusterConfig,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> Result<DurabilityReport> {
        if cancel.is_cancelled() {
            return Err(DurabilityError::Cancelled);
        }
        if requirement.is_none() {
            return Ok(DurabilityReport::default());
        }
        let plan = Plan::new(mutation, requirement, config)?;

        let deadline = Instant::now() + timeout;
        let mut last = Tally::default();
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            res = tokio::time::timeout_at(deadline, self.poll(mutation, &requirement, &plan, &mut last)) => Some(res),
        };

        match outcome {
            None => {
                debug!(cas = mutation.cas, "durability check cancelled");
                Err(DurabilityError::Cancelled)
            }
            Some(Ok(result)) => result,
            Some(Err(_)) => {
                debug!(
                    cas = mutation.cas,
                    persisted = last.persisted,
                    replicated = last.replicated,
                    %requirement,
                    "durability check timed out"
                );
                counter!("durability.timeouts").increment(1);
                Err(DurabilityError::DurabilityTimeout {
                    persisted: last.persisted,
                    replicated: last.replicated,
                })
            }
        }
    }

    async fn poll(
        &self,
        mutation: &Mutation,
        requirement: &DurabilityRequirement,
        plan: &Plan,
        last: &mut Tally,
    ) -> Result<DurabilityReport> {
        let mut delay = self.settings.interval;
        let mut rounds = 0u32;
        loop {
            rounds += 1;
            counter!("durability.polls").increment(1);

            let requests = plan.targets.iter().map(|(node, master)| async move {
                let reply = self
                    .observer
                    .observe(node, plan.partition, &mutation.key)
                    .await;
                (*master, reply)
            });
            let replies = join_all(requests)
                .await
                .into_iter()
                .filter_map(|(master, reply)| match reply {
                    Ok(reply) => Some((master, reply)),
                    Err(e) => {
                        debug!(error = %e, "observe failed, counting as not yet");
                        None
                    }
                });

            *last = Tally::count(mutation, replies)?;
            if last.satisfies(requirement) {
                debug!(
                    cas = mutation.cas,
                    rounds,
                    persisted = last.persisted,
                    replicated = last.replicated,
                    "durability requirement met"
                );
                return Ok(DurabilityReport {
                    persisted: last.persisted,
                    replicated: last.replicated,
                    rounds,
                });
            }

            tokio::time::sleep(delay).await;
            delay = (delay * 2).min(self.settings.max_interval);
        }
    }
}

/// Nodes to ask, resolved once per check from the snapshot it was issued on.
struct Plan {
    partition: u16,
    /// `(node, is_master)`
    targets: Vec<(Node, bool)>,
}

impl Plan {
    fn new(
        mutation: &Mutation,
        requirement: DurabilityRequirement,
        config: &ClusterConfig,
    ) -> Result<Self> {
        // Unpartitioned buckets neither persist nor replicate.
        if config.kind() == BucketKind::Unpartitioned {
            return Err(DurabilityError::InsufficientTopology {
                requirement,
                replicas: 0,
            });
        }
        let decision = locate(&mutation.key, config)?;
        requirement.check(decision.replicas.len())?;

        let mut targets = Vec::new();
        if requirement.persist_to.count() > 0 {
            targets.push((decision.target, true));
        }
        if requirement.persist_to.touches_replica() || requirement.replicate_to.touches_replica() {
            targets.extend(decision.replicas.into_iter().map(|n| (n, false)));
        }
        Ok(Self {
            partition: decision.partition.unwrap_or_default(),
            targets,
        })
    }
}

/// A check running on its own task.
pub struct DurabilityHandle {
    task: Option<JoinHandle<Result<DurabilityReport>>>,
    cancel: CancellationToken,
}

impl DurabilityHandle {
    /// Wait for the outcome.
    pub async fn wait(mut self) -> Result<DurabilityReport> {
        match self.task.take() {
            Some(task) => task.await.unwrap_or(Err(DurabilityError::Cancelled)),
            None => Err(DurabilityError::Cancelled),
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl Drop for DurabilityHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
