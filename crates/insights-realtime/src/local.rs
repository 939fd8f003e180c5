//! In-process change feed.

use crate::{
    ChangeEvent, ChangeFeed, ChangeHandler, ChannelRegistry, ChannelSpec, RealtimeResult,
    Subscription,
};
use std::sync::Arc;
use tracing::trace;

/// Delivers events published by an in-process backend synchronously to
/// matching subscribers.
#[derive(Debug, Default)]
pub struct LocalChangeFeed {
    registry: Arc<ChannelRegistry>,
}

impl LocalChangeFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver an event. Returns the number of handlers invoked.
    pub fn publish(&self, event: ChangeEvent) -> usize {
        let delivered = self.registry.dispatch_matching(&event);
        trace!(table = %event.table, kind = ?event.kind, delivered, "Published change");
        delivered
    }

    /// Number of live registrations.
    pub fn active_channels(&self) -> usize {
        self.registry.len()
    }
}

impl ChangeFeed for LocalChangeFeed {
    fn subscribe(
        &self,
        spec: ChannelSpec,
        handler: ChangeHandler,
    ) -> RealtimeResult<Subscription> {
        let key = spec.key.clone();
        let (id, _) = self.registry.register(spec, handler);
        Ok(Subscription::new(key, id, &self.registry))
    }
}
