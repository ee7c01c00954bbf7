//! Background refresh loop.
//!
//! One task per provider. It follows a push stream when the source offers
//! one and falls back to polling every `interval` otherwise. The task only
//! holds a weak reference so it never keeps a dropped provider alive.

use std::sync::Weak;
use std::time::Duration;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::provider::ConfigurationProvider;
use crate::source::ConfigStream;

enum Subscription {
    Open(ConfigStream),
    Unsupported,
    Failed,
    Gone,
}

pub(crate) async fn run(
    provider: Weak<ConfigurationProvider>,
    cancel: CancellationToken,
    interval: Duration,
) {
    let mut streaming = true;
    loop {
        if streaming {
            match subscribe(&provider).await {
                Subscription::Open(stream) => follow(&provider, stream, &cancel).await,
                Subscription::Unsupported => {
                    debug!("configuration source cannot stream, polling instead");
                    streaming = false;
                }
                Subscription::Failed => {}
                Subscription::Gone => return,
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(interval) => {}
        }

        let Some(p) = provider.upgrade() else { return };
        if let Err(e) = p.poll_once().await {
            warn!(error = %e, "periodic configuration refresh failed");
        }
    }
}

async fn subscribe(provider: &Weak<ConfigurationProvider>) -> Subscription {
    let Some(p) = provider.upgrade() else {
        return Subscription::Gone;
    };
    let settings = p.settings();
    for endpoint in p.known_endpoints() {
        match p
            .source()
            .subscribe(&endpoint, &settings.bucket, &settings.credentials)
            .await
        {
            Ok(Some(stream)) => {
                debug!(%endpoint, "following configuration stream");
                return Subscription::Open(stream);
            }
            Ok(None) => return Subscription::Unsupported,
            Err(e) => debug!(%endpoint, error = %e, "could not open configuration stream"),
        }
    }
    Subscription::Failed
}

async fn follow(
    provider: &Weak<ConfigurationProvider>,
    mut stream: ConfigStream,
    cancel: &CancellationToken,
) {
    loop {
        let item = tokio::select! {
            _ = cancel.cancelled() => return,
            item = stream.next() => item,
        };
        match item {
            Some(Ok(config)) => {
                let Some(p) = provider.upgrade() else { return };
                p.accept(config);
            }
            Some(Err(e)) => {
                warn!(error = %e, "configuration stream failed");
                return;
            }
            None => {
                debug!("configuration stream closed");
                return;
            }
        }
    }
}
