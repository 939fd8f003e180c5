//! Like count and liked flag for one article.

use crate::state::StoreFailure;
use insights_accessors::{get_like_count, has_user_liked, toggle_like, LikeToggle};
use insights_gateway::Gateway;
use insights_model::{tables, ArticleId, UserId};
use insights_realtime::{ChangeEvent, ChangeFeed, ChangeHandler, ChannelSpec, RealtimeResult, Subscription};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Observable like state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LikeSnapshot {
    pub count: u64,
    pub liked: bool,
    /// A toggle is in flight; `count`/`liked` hold the optimistic values.
    pub pending: bool,
    pub error: Option<StoreFailure>,
}

/// Result of [`LikeState::toggle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// The backend applied the toggle.
    Applied(LikeToggle),
    /// Nobody is signed in; nothing was sent.
    SignInRequired,
    /// Likes are not available on this backend; the flip was rolled back.
    Unavailable,
    /// The backend call failed; the flip was rolled back.
    Failed(StoreFailure),
}

struct Inner {
    gateway: Arc<dyn Gateway>,
    article_id: ArticleId,
    user: RwLock<Option<UserId>>,
    state: watch::Sender<LikeSnapshot>,
    generation: AtomicU64,
}

impl Inner {
    async fn refresh(&self) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let user = self.user.read().clone();
        let gateway = self.gateway.as_ref();

        let count = get_like_count(gateway, &self.article_id).await;
        let liked = has_user_liked(gateway, &self.article_id, user.as_ref()).await;
        if self.generation.load(Ordering::SeqCst) != generation {
            debug!(article_id = %self.article_id, "Dropping superseded like refresh");
            return;
        }

        self.state.send_modify(|s| match (count, liked) {
            (Ok(count), Ok(liked)) => {
                s.count = count;
                s.liked = liked;
                s.error = None;
            }
            (Err(e), _) | (_, Err(e)) => {
                warn!(article_id = %self.article_id, error = %e, "Failed to load likes");
                s.error = Some(StoreFailure::from(&e));
            }
        });
    }
}

/// Like view for one article.
#[derive(Clone)]
pub struct LikeState {
    inner: Arc<Inner>,
}

impl LikeState {
    pub fn new(gateway: Arc<dyn Gateway>, article_id: ArticleId, user: Option<UserId>) -> Self {
        let (state, _) = watch::channel(LikeSnapshot::default());
        Self {
            inner: Arc::new(Inner {
                gateway,
                article_id,
                user: RwLock::new(user),
                state,
                generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn snapshot(&self) -> LikeSnapshot {
        self.inner.state.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<LikeSnapshot> {
        self.inner.state.subscribe()
    }

    /// Change the viewing user and reload the liked flag.
    pub async fn set_user(&self, user: Option<UserId>) {
        *self.inner.user.write() = user;
        self.refresh().await;
    }

    /// Reload count and liked flag.
    pub async fn refresh(&self) {
        self.inner.refresh().await;
    }

    /// Flip the like optimistically, then settle on the backend's answer.
    pub async fn toggle(&self) -> ToggleOutcome {
        let Some(user) = self.inner.user.read().clone() else {
            return ToggleOutcome::SignInRequired;
        };

        // Results of refreshes started before the flip are stale.
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        let before = self.snapshot();
        self.inner.state.send_modify(|s| {
            s.liked = !before.liked;
            s.count = if before.liked {
                before.count.saturating_sub(1)
            } else {
                before.count + 1
            };
            s.pending = true;
        });

        let result = toggle_like(self.inner.gateway.as_ref(), &self.inner.article_id, &user).await;
        let rollback = |s: &mut LikeSnapshot| {
            s.liked = before.liked;
            s.count = before.count;
            s.pending = false;
        };

        match result {
            Ok(Some(toggle)) => {
                self.inner.state.send_modify(|s| {
                    s.liked = toggle.liked;
                    s.count = toggle.count;
                    s.pending = false;
                    s.error = None;
                });
                ToggleOutcome::Applied(toggle)
            }
            Ok(None) => {
                self.inner.state.send_modify(rollback);
                ToggleOutcome::Unavailable
            }
            Err(e) => {
                warn!(article_id = %self.inner.article_id, error = %e, "Like toggle failed");
                let failure = StoreFailure::from(&e);
                self.inner.state.send_modify(|s| {
                    rollback(s);
                    s.error = Some(failure.clone());
                });
                ToggleOutcome::Failed(failure)
            }
        }
    }

    /// Refresh on every likes change for this article.
    ///
    /// Fails outside a Tokio runtime; refreshes run on it.
    pub fn subscribe(&self, feed: &dyn ChangeFeed) -> RealtimeResult<Subscription> {
        let runtime = Handle::try_current()?;
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let handler: ChangeHandler = Arc::new(move |_event: ChangeEvent| {
            if let Some(inner) = weak.upgrade() {
                runtime.spawn(async move { inner.refresh().await });
            }
        });
        let id = self.inner.article_id.as_str();
        feed.subscribe(
            ChannelSpec::filtered(format!("likes-{id}"), tables::LIKES, "blog_id", id),
            handler,
        )
    }
}

impl std::fmt::Debug for LikeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LikeState")
            .field("article_id", &self.inner.article_id)
            .field("state", &*self.inner.state.borrow())
            .finish_non_exhaustive()
    }
}
