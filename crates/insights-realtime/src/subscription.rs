//! Subscription handles.

use crate::ChannelRegistry;
use std::sync::{Arc, Weak};
use tracing::debug;

type ReleaseHook = Box<dyn FnOnce() + Send + Sync>;

/// A live channel registration. Closing or dropping it releases the channel.
pub struct Subscription {
    key: String,
    id: u64,
    registry: Weak<ChannelRegistry>,
    on_release: Option<ReleaseHook>,
}

impl Subscription {
    pub(crate) fn new(key: String, id: u64, registry: &Arc<ChannelRegistry>) -> Self {
        Self {
            key,
            id,
            registry: Arc::downgrade(registry),
            on_release: None,
        }
    }

    /// Run `hook` when this handle releases a still-current registration.
    pub(crate) fn on_release(mut self, hook: impl FnOnce() + Send + Sync + 'static) -> Self {
        self.on_release = Some(Box::new(hook));
        self
    }

    /// The channel key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Whether this handle still owns its channel (not closed or superseded).
    pub fn is_active(&self) -> bool {
        self.registry
            .upgrade()
            .is_some_and(|registry| registry.is_current(&self.key, self.id))
    }

    /// Release the channel.
    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        self.registry = Weak::new();
        if registry.remove(&self.key, self.id) {
            debug!(key = %self.key, "Released channel");
            if let Some(hook) = self.on_release.take() {
                hook();
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("active", &self.is_active())
            .finish()
    }
}

/// The subscriptions owned by one view, released together.
#[derive(Debug, Default)]
pub struct SubscriptionSet {
    subscriptions: Vec<Subscription>,
}

impl SubscriptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, subscription: Subscription) {
        self.subscriptions.push(subscription);
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Keys of the handles still held.
    pub fn keys(&self) -> Vec<&str> {
        self.subscriptions.iter().map(Subscription::key).collect()
    }

    /// Release every channel.
    pub fn close_all(&mut self) {
        for subscription in self.subscriptions.drain(..) {
            subscription.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ChangeFeed, ChangeHandler, ChannelSpec, LocalChangeFeed};
    use std::sync::atomic::{AtomicBool, Ordering};

    fn noop() -> ChangeHandler {
        Arc::new(|_| {})
    }

    #[test]
    fn drop_releases_channel() {
        let feed = LocalChangeFeed::new();
        {
            let sub = feed
                .subscribe(ChannelSpec::table("blogs-changes", "articles"), noop())
                .unwrap();
            assert!(sub.is_active());
            assert_eq!(feed.active_channels(), 1);
        }
        assert_eq!(feed.active_channels(), 0);
    }

    #[test]
    fn superseded_handle_does_not_release_successor() {
        let feed = LocalChangeFeed::new();
        let spec = ChannelSpec::filtered("likes-a1", "likes", "blog_id", "a1");
        let first = feed.subscribe(spec.clone(), noop()).unwrap();
        let second = feed.subscribe(spec, noop()).unwrap();
        assert!(!first.is_active());

        first.close();
        assert!(second.is_active());
        assert_eq!(feed.active_channels(), 1);
    }

    #[test]
    fn release_hook_runs_once_for_current_registration() {
        let registry = Arc::new(ChannelRegistry::new());
        let (id, _) = registry.register(ChannelSpec::table("k", "articles"), noop());
        let fired = Arc::new(AtomicBool::new(false));
        let f = fired.clone();
        let sub = Subscription::new("k".to_string(), id, &registry)
            .on_release(move || f.store(true, Ordering::SeqCst));
        sub.close();
        assert!(fired.load(Ordering::SeqCst));
        assert!(registry.is_empty());
    }

    #[test]
    fn set_closes_everything() {
        let feed = LocalChangeFeed::new();
        let mut set = SubscriptionSet::new();
        set.push(
            feed.subscribe(ChannelSpec::filtered("likes-a1", "likes", "blog_id", "a1"), noop())
                .unwrap(),
        );
        set.push(
            feed.subscribe(
                ChannelSpec::filtered("comments-a1", "comments", "blog_id", "a1"),
                noop(),
            )
            .unwrap(),
        );
        assert_eq!(set.keys(), vec!["likes-a1", "comments-a1"]);
        set.close_all();
        assert!(set.is_empty());
        assert_eq!(feed.active_channels(), 0);
    }
}
