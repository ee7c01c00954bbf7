//! Observe requests sent over the router's node connections.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use corelib::Node;
use durability::{ObserveError, ObserveReply, Observer};

use crate::connection::{Operation, Request, Response};
use crate::router::RequestRouter;

/// [`Observer`] backed by the same connections keyed operations use.
pub struct RouterObserver {
    router: Arc<RequestRouter>,
}

impl RouterObserver {
    pub fn new(router: Arc<RequestRouter>) -> Self {
        Self { router }
    }
}

#[async_trait]
impl Observer for RouterObserver {
    async fn observe(
        &self,
        node: &Node,
        partition: u16,
        key: &[u8],
    ) -> Result<ObserveReply, ObserveError> {
        let request = Request {
            key: Bytes::copy_from_slice(key),
            partition: Some(partition),
            op: Operation::Observe,
        };
        match self.router.send_to(node, request).await {
            Ok(Response::Observed(reply)) => Ok(reply),
            Ok(other) => Err(ObserveError::new(
                node,
                format!("unexpected observe response: {other:?}"),
            )),
            Err(e) => Err(ObserveError::new(node, e.to_string())),
        }
    }
}
