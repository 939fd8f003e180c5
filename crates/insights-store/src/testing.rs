//! Gateway double for exercising fetch and event races.

use async_trait::async_trait;
use insights_gateway::{Filter, Gateway, GatewayResult, MemoryGateway, Query, Record};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Wraps a [`MemoryGateway`]. After [`hold_next`](Self::hold_next), the next
/// read or procedure call runs against the backend and then waits for
/// `release` before returning its result.
pub(crate) struct HeldGateway {
    pub(crate) inner: Arc<MemoryGateway>,
    hold: AtomicBool,
    /// Notified once the held request has its result.
    pub(crate) taken: Notify,
    pub(crate) release: Notify,
}

impl HeldGateway {
    pub(crate) fn new(inner: Arc<MemoryGateway>) -> Self {
        Self {
            inner,
            hold: AtomicBool::new(false),
            taken: Notify::new(),
            release: Notify::new(),
        }
    }

    pub(crate) fn hold_next(&self) {
        self.hold.store(true, Ordering::SeqCst);
    }

    async fn gate(&self) {
        if self.hold.swap(false, Ordering::SeqCst) {
            self.taken.notify_one();
            self.release.notified().await;
        }
    }
}

#[async_trait]
impl Gateway for HeldGateway {
    async fn read(&self, collection: &str, query: &Query) -> GatewayResult<Vec<Record>> {
        let rows = self.inner.read(collection, query).await;
        self.gate().await;
        rows
    }

    async fn read_one(&self, collection: &str, filter: &Filter) -> GatewayResult<Record> {
        self.inner.read_one(collection, filter).await
    }

    async fn write(&self, collection: &str, record: Record) -> GatewayResult<Record> {
        self.inner.write(collection, record).await
    }

    async fn update(
        &self,
        collection: &str,
        filter: &Filter,
        patch: Record,
    ) -> GatewayResult<Vec<Record>> {
        self.inner.update(collection, filter, patch).await
    }

    async fn delete(&self, collection: &str, filter: &Filter) -> GatewayResult<Vec<Record>> {
        self.inner.delete(collection, filter).await
    }

    async fn call(&self, procedure: &str, args: Value) -> GatewayResult<Value> {
        let result = self.inner.call(procedure, args).await;
        self.gate().await;
        result
    }

    fn set_access_token(&self, access_token: Option<String>) {
        self.inner.set_access_token(access_token);
    }
}
