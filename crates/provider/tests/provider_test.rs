//! Tests for bootstrap, revision handling, forced refresh and the refresh task.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use corelib::partitioner::Crc32Hasher;
use corelib::{ClusterConfig, Node, Partition};
use parking_lot::Mutex;
use provider::{
    ConfigSource, ConfigStream, ConfigurationProvider, Credentials, Endpoint, FetchError,
    ProviderError, ProviderSettings,
};

fn config(revision: u64, hosts: &[&str]) -> ClusterConfig {
    let nodes: Vec<Node> = hosts.iter().map(|h| Node::new(*h, 11210, 8092)).collect();
    let partitions = (0..4)
        .map(|p| Partition::new(Some(p % nodes.len()), vec![]))
        .collect();
    ClusterConfig::partitioned(revision, nodes, partitions, Arc::new(Crc32Hasher)).unwrap()
}

fn settings() -> ProviderSettings {
    ProviderSettings::new(["seed-a:8091", "seed-b:8091", "seed-c:8091"])
        .with_bucket("default")
        .with_credentials(Credentials::new("app", "secret"))
}

/// In-memory source: endpoints listed in `answers` respond, all others are
/// unreachable.
#[derive(Default)]
struct FakeSource {
    answers: Mutex<HashMap<String, ClusterConfig>>,
    stream: Mutex<Option<Vec<ClusterConfig>>>,
    calls: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl FakeSource {
    fn answering(endpoint: &str, config: ClusterConfig) -> Self {
        let source = Self::default();
        source.set(endpoint, config);
        source
    }

    fn set(&self, endpoint: &str, config: ClusterConfig) {
        self.answers.lock().insert(endpoint.to_string(), config);
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl ConfigSource for FakeSource {
    async fn fetch(
        &self,
        endpoint: &Endpoint,
        bucket: &str,
        credentials: &Credentials,
    ) -> Result<ClusterConfig, FetchError> {
        assert_eq!(bucket, "default");
        assert_eq!(credentials.username, "app");
        self.calls.lock().push(endpoint.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let answer = self.answers.lock().get(&endpoint.to_string()).cloned();
        answer.ok_or_else(|| FetchError::Unreachable("connection refused".into()))
    }

    async fn subscribe(
        &self,
        _endpoint: &Endpoint,
        _bucket: &str,
        _credentials: &Credentials,
    ) -> Result<Option<ConfigStream>, FetchError> {
        let configs = self.stream.lock().take();
        Ok(configs.map(|c| -> ConfigStream {
            Box::pin(futures::stream::iter(c.into_iter().map(Ok)))
        }))
    }
}

// ============================================================================
// Bootstrap
// ============================================================================

#[tokio::test]
async fn test_bootstrap_tries_seeds_in_order() {
    let source = Arc::new(FakeSource::answering("seed seed-c:8091", config(3, &["n1"])));
    let provider = ConfigurationProvider::bootstrap(settings(), source.clone())
        .await
        .unwrap();

    assert_eq!(provider.current().revision(), 3);
    assert_eq!(
        source.calls(),
        vec!["seed seed-a:8091", "seed seed-b:8091", "seed seed-c:8091"]
    );
}

#[tokio::test]
async fn test_bootstrap_fails_when_no_seed_answers() {
    let source = Arc::new(FakeSource::default());
    let err = ConfigurationProvider::bootstrap(settings(), source.clone())
        .await
        .err()
        .unwrap();

    match err {
        ProviderError::ClusterUnreachable { failures } => {
            assert_eq!(failures.len(), 3);
            assert_eq!(failures[0].endpoint, "seed seed-a:8091");
            assert!(failures[2].reason.contains("connection refused"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_bootstrap_rejects_invalid_settings() {
    let source = Arc::new(FakeSource::default());
    let err = ConfigurationProvider::bootstrap(settings().with_max_config_check(0), source.clone())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ProviderError::InvalidSettings(_)));
    assert!(source.calls().is_empty());
}

// ============================================================================
// Revision handling
// ============================================================================

#[test]
fn test_stale_config_never_replaces_current() {
    let provider = ConfigurationProvider::with_config(
        settings(),
        Arc::new(FakeSource::default()),
        config(5, &["n1", "n2"]),
    );
    let before = provider.current();

    assert!(!provider.accept(config(5, &["n9"])));
    assert!(!provider.accept(config(4, &["n9"])));
    assert!(Arc::ptr_eq(&before, &provider.current()));

    assert!(provider.accept(config(6, &["n1"])));
    assert_eq!(provider.current().revision(), 6);
    assert_eq!(provider.current().nodes().len(), 1);
}

#[test]
fn test_concurrent_accepts_keep_the_highest_revision() {
    let provider = ConfigurationProvider::with_config(
        settings(),
        Arc::new(FakeSource::default()),
        config(1, &["n1"]),
    );
    let handles: Vec<_> = (2..=50u64)
        .map(|rev| {
            let provider = Arc::clone(&provider);
            std::thread::spawn(move || {
                provider.accept(config(rev, &["n1"]));
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(provider.current().revision(), 50);
}

// ============================================================================
// Forced refresh
// ============================================================================

#[tokio::test]
async fn test_force_refresh_asks_known_nodes_first() {
    let source = Arc::new(FakeSource::answering("node n2:11210", config(8, &["n1", "n2"])));
    let provider =
        ConfigurationProvider::with_config(settings(), source.clone(), config(7, &["n1", "n2"]));

    let refreshed = provider.force_refresh().await.unwrap();
    assert_eq!(refreshed.revision(), 8);
    assert_eq!(source.calls(), vec!["node n1:11210", "node n2:11210"]);
}

#[tokio::test]
async fn test_force_refresh_falls_back_to_seeds() {
    let source = Arc::new(FakeSource::answering("seed seed-b:8091", config(8, &["n3"])));
    let provider = ConfigurationProvider::with_config(settings(), source.clone(), config(7, &["n1"]));

    assert_eq!(provider.force_refresh().await.unwrap().revision(), 8);
    assert_eq!(
        source.calls(),
        vec!["node n1:11210", "seed seed-a:8091", "seed seed-b:8091"]
    );
}

#[tokio::test]
async fn test_force_refresh_reinstalls_identical_revision() {
    let source = Arc::new(FakeSource::answering("node n1:11210", config(7, &["n1"])));
    let provider = ConfigurationProvider::with_config(settings(), source.clone(), config(7, &["n1"]));
    let before = provider.current();

    let after = provider.force_refresh().await.unwrap();
    assert_eq!(after.revision(), 7);
    assert!(!Arc::ptr_eq(&before, &after));
}

#[tokio::test]
async fn test_reconnect_uses_seeds_only() {
    let source = Arc::new(FakeSource::answering("seed seed-a:8091", config(9, &["n1"])));
    let provider = ConfigurationProvider::with_config(settings(), source.clone(), config(7, &["n1"]));

    assert_eq!(provider.reconnect().await.unwrap().revision(), 9);
    assert_eq!(source.calls(), vec!["seed seed-a:8091"]);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_refreshes_are_coalesced() {
    let source = Arc::new(FakeSource {
        delay: Some(Duration::from_millis(50)),
        ..FakeSource::default()
    });
    source.set("node n1:11210", config(2, &["n1"]));
    let provider = ConfigurationProvider::with_config(settings(), source.clone(), config(1, &["n1"]));

    let (a, b) = tokio::join!(provider.force_refresh(), provider.force_refresh());
    assert_eq!(a.unwrap().revision(), 2);
    assert_eq!(b.unwrap().revision(), 2);
    assert_eq!(source.calls().len(), 1);
}

#[tokio::test]
async fn test_unreachable_refresh_keeps_current() {
    let provider = ConfigurationProvider::with_config(
        settings(),
        Arc::new(FakeSource::default()),
        config(7, &["n1"]),
    );
    let err = provider.force_refresh().await.unwrap_err();
    assert!(matches!(err, ProviderError::ClusterUnreachable { .. }));
    assert_eq!(provider.current().revision(), 7);
}

#[tokio::test]
async fn test_refresh_after_shutdown_is_rejected() {
    let source = Arc::new(FakeSource::answering("node n1:11210", config(8, &["n1"])));
    let provider = ConfigurationProvider::with_config(settings(), source.clone(), config(7, &["n1"]));
    provider.shutdown().await;

    assert!(matches!(
        provider.force_refresh().await.unwrap_err(),
        ProviderError::Shutdown
    ));
    assert!(source.calls().is_empty());
}

// ============================================================================
// Background task
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_background_task_polls() {
    let source = Arc::new(FakeSource::answering("node n1:11210", config(8, &["n1"])));
    let provider = ConfigurationProvider::with_config(
        settings().with_refresh_interval(Duration::from_secs(30)),
        source.clone(),
        config(7, &["n1"]),
    );
    provider.start();

    tokio::time::sleep(Duration::from_secs(29)).await;
    assert_eq!(provider.current().revision(), 7);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(provider.current().revision(), 8);

    provider.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_background_task_follows_stream() {
    let source = Arc::new(FakeSource::default());
    *source.stream.lock() = Some(vec![
        config(8, &["n1"]),
        config(6, &["n9"]),
        config(10, &["n1", "n2"]),
    ]);
    let provider = ConfigurationProvider::with_config(settings(), source.clone(), config(7, &["n1"]));
    provider.start();

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(provider.current().revision(), 10);
    assert_eq!(provider.current().nodes().len(), 2);
    assert!(source.calls().is_empty());

    provider.shutdown().await;
}
