//! # insights-store
//!
//! Observable client state built on the gateway, accessors, change feed and
//! authentication service.
//!
//! - [`ArticleStore`] - the article collection with search/tag/page views,
//!   featured list and current article, reconciled against change events
//! - [`AuthStore`] - session, user and admin flag, updated together
//! - [`CommentThread`] and [`LikeState`] - per-article views
//! - [`guard_route`] - admin-area routing decision
//! - [`AppContext`] - wires everything for one process and tears it down
//!
//! Stores never return fetch errors. Failures land in the store's `error`
//! field as a [`StoreFailure`] and the previous data is kept, so a view can
//! always offer a retry.
//!
//! Each store publishes its state through a `tokio::sync::watch` channel:
//! `snapshot()` for a copy, `watch()` for change notifications.

mod articles;
mod auth;
mod comments;
mod context;
mod error;
mod likes;
mod mock;
mod reconcile;
mod route;
mod state;
#[cfg(test)]
mod testing;

pub use articles::{ArticleStore, ArticlesState, ARTICLES_CHANNEL};
pub use auth::{AuthState, AuthStore};
pub use comments::{CommentThread, ThreadState};
pub use context::{AppContext, Backend};
pub use error::{ContextError, ContextResult};
pub use likes::{LikeSnapshot, LikeState, ToggleOutcome};
pub use mock::{sample_articles, DEMO_ADMIN_EMAIL, DEMO_PASSWORD, DEMO_USER_EMAIL};
pub use route::{guard_route, RouteDecision, ADMIN_LOGIN_PATH};
pub use state::{LoadState, StoreFailure};
