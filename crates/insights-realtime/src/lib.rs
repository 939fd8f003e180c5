//! # insights-realtime
//!
//! Subscriptions to per-table change feeds. A caller names a channel key, a
//! table and an optional parent-record filter, and receives
//! [`ChangeEvent`]s through a handler until the returned [`Subscription`]
//! is closed or dropped.
//!
//! - One live registration per channel key: subscribing again under the same
//!   key supersedes the earlier handle.
//! - Handles release their channel on drop; [`SubscriptionSet`] groups the
//!   handles of one view so teardown is a single call.
//! - No ordering is guaranteed between an initial fetch and the first event;
//!   consumers reconcile idempotently.
//!
//! Implementations: [`SupabaseRealtime`] (Phoenix channels over a websocket)
//! and [`LocalChangeFeed`] (in-process, fed by the in-memory gateway).

mod channel;
mod error;
mod event;
mod feed;
mod local;
mod protocol;
mod registry;
mod subscription;
mod supabase;

pub use channel::{ChannelSpec, RowFilter};
pub use error::{RealtimeError, RealtimeResult};
pub use event::{ChangeEvent, ChangeKind};
pub use feed::{ChangeFeed, ChangeHandler};
pub use local::LocalChangeFeed;
pub use registry::ChannelRegistry;
pub use subscription::{Subscription, SubscriptionSet};
pub use supabase::{ConnectionState, RealtimeConfig, SupabaseRealtime};
