//! The change-feed contract.

use crate::{ChangeEvent, ChannelSpec, RealtimeResult, Subscription};
use std::sync::Arc;

/// Callback invoked for every event on a channel.
///
/// Runs on the feed's delivery path; it must not block.
pub type ChangeHandler = Arc<dyn Fn(ChangeEvent) + Send + Sync>;

/// A source of row-change notifications.
pub trait ChangeFeed: Send + Sync {
    /// Start receiving events for `spec`.
    ///
    /// A live registration under the same key is superseded: its handler
    /// stops receiving events and its handle becomes inactive.
    fn subscribe(&self, spec: ChannelSpec, handler: ChangeHandler)
        -> RealtimeResult<Subscription>;

    /// Authorize subsequent channel traffic as the given user.
    fn set_access_token(&self, _access_token: Option<String>) {}
}
