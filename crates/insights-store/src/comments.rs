//! Comment thread for one article.

use crate::reconcile::{self, Placement};
use crate::state::{LoadState, StoreFailure};
use insights_accessors::{add_comment, delete_comment, get_comments, get_user_profile, update_comment};
use insights_gateway::{Gateway, GatewayResult};
use insights_model::{
    tables, ArticleId, AuthorProfile, Comment, CommentId, CommentWithAuthor, Keyed, UserId,
};
use insights_realtime::{
    ChangeEvent, ChangeFeed, ChangeHandler, ChangeKind, ChannelSpec, RealtimeResult, Subscription,
};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, error, warn};

/// Observable thread state; comments are oldest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ThreadState {
    pub load: LoadState,
    pub comments: Vec<CommentWithAuthor>,
    pub error: Option<StoreFailure>,
}

impl ThreadState {
    fn merge(&mut self, comment: Comment) {
        match self
            .comments
            .iter_mut()
            .find(|c| c.comment.id == comment.id)
        {
            Some(existing) => existing.comment = comment,
            None => {
                reconcile::upsert(
                    &mut self.comments,
                    CommentWithAuthor::new(comment, None),
                    Placement::Back,
                );
            }
        }
    }

    fn set_author(&mut self, user_id: &UserId, author: &AuthorProfile) {
        for c in self.comments.iter_mut().filter(|c| &c.comment.user_id == user_id) {
            c.author = author.clone();
        }
    }
}

struct Inner {
    gateway: Arc<dyn Gateway>,
    article_id: ArticleId,
    state: watch::Sender<ThreadState>,
    generation: AtomicU64,
    /// Events applied while a load is in flight, replayed over its result.
    in_flight: Mutex<Option<Vec<ChangeEvent>>>,
}

/// Comments on one article.
#[derive(Clone)]
pub struct CommentThread {
    inner: Arc<Inner>,
}

impl CommentThread {
    pub fn new(gateway: Arc<dyn Gateway>, article_id: ArticleId) -> Self {
        let (state, _) = watch::channel(ThreadState::default());
        Self {
            inner: Arc::new(Inner {
                gateway,
                article_id,
                state,
                generation: AtomicU64::new(0),
                in_flight: Mutex::new(None),
            }),
        }
    }

    pub fn article_id(&self) -> &ArticleId {
        &self.inner.article_id
    }

    pub fn snapshot(&self) -> ThreadState {
        self.inner.state.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<ThreadState> {
        self.inner.state.subscribe()
    }

    /// Load the thread with author profiles. Change events applied while the
    /// load is in flight are replayed over the loaded comments.
    pub async fn load(&self) {
        let generation = {
            let mut in_flight = self.inner.in_flight.lock();
            *in_flight = Some(Vec::new());
            self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1
        };
        self.inner.state.send_modify(|s| s.load = LoadState::Loading);

        let result = get_comments(self.inner.gateway.as_ref(), &self.inner.article_id).await;
        let mut in_flight = self.inner.in_flight.lock();
        if self.inner.generation.load(Ordering::SeqCst) != generation {
            debug!(article_id = %self.inner.article_id, "Dropping superseded comment load");
            return;
        }
        let missed = in_flight.take().unwrap_or_default();

        let article_id = &self.inner.article_id;
        self.inner.state.send_modify(|s| match result {
            Ok(comments) => {
                let previous = std::mem::replace(&mut s.comments, comments);
                for event in &missed {
                    if reconcile_event(s, article_id, event).1.is_none() {
                        continue;
                    }
                    // Keep an author resolved while the load was in flight.
                    let before = event
                        .record_id()
                        .and_then(|id| previous.iter().find(|c| c.key() == id));
                    if let (Some(appended), Some(before)) = (s.comments.last_mut(), before) {
                        appended.author = before.author.clone();
                    }
                }
                s.load = LoadState::Ready;
                s.error = None;
            }
            Err(e) => {
                error!(article_id = %self.inner.article_id, error = %e, "Failed to load comments");
                s.load = LoadState::Errored;
                s.error = Some(StoreFailure::from(&e));
            }
        });
    }

    /// Post a comment as `user_id`. Blank bodies are rejected without a
    /// backend call. `None` when comments are not available.
    pub async fn add(
        &self,
        user_id: &UserId,
        content: &str,
        parent_id: Option<&CommentId>,
    ) -> GatewayResult<Option<CommentWithAuthor>> {
        let added = add_comment(
            self.inner.gateway.as_ref(),
            &self.inner.article_id,
            user_id,
            content,
            parent_id,
        )
        .await?;
        if let Some(comment) = &added {
            self.inner.state.send_modify(|s| {
                reconcile::upsert(&mut s.comments, comment.clone(), Placement::Back);
            });
        }
        Ok(added)
    }

    /// Delete one of `user_id`'s comments. Returns whether it was removed.
    pub async fn delete(&self, comment_id: &CommentId, user_id: &UserId) -> GatewayResult<bool> {
        let deleted = delete_comment(self.inner.gateway.as_ref(), comment_id, user_id).await?;
        if deleted {
            self.inner.state.send_modify(|s| {
                reconcile::remove(&mut s.comments, comment_id.as_str());
            });
        }
        Ok(deleted)
    }

    /// Replace the body of one of `user_id`'s comments.
    pub async fn edit(
        &self,
        comment_id: &CommentId,
        user_id: &UserId,
        content: &str,
    ) -> GatewayResult<Comment> {
        let updated =
            update_comment(self.inner.gateway.as_ref(), comment_id, user_id, content).await?;
        self.inner.state.send_modify(|s| s.merge(updated.clone()));
        Ok(updated)
    }

    /// Reconcile one change event. Returns the author whose profile still
    /// needs resolving for a newly appended comment.
    pub fn apply_event(&self, event: &ChangeEvent) -> Option<UserId> {
        apply(&self.inner, event)
    }

    /// Follow comment changes for this article.
    ///
    /// Fails outside a Tokio runtime; profile lookups for new
    /// comments run on it.
    pub fn subscribe(&self, feed: &dyn ChangeFeed) -> RealtimeResult<Subscription> {
        let runtime = Handle::try_current()?;
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let handler: ChangeHandler = Arc::new(move |event: ChangeEvent| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if let Some(user_id) = apply(&inner, &event) {
                runtime.spawn(async move { resolve_author(&inner, &user_id).await });
            }
        });
        let id = self.inner.article_id.as_str();
        feed.subscribe(
            ChannelSpec::filtered(format!("comments-{id}"), tables::COMMENTS, "blog_id", id),
            handler,
        )
    }
}

fn apply(inner: &Inner, event: &ChangeEvent) -> Option<UserId> {
    let mut in_flight = inner.in_flight.lock();
    if let Some(events) = in_flight.as_mut() {
        events.push(event.clone());
    }
    let mut author = None;
    inner.state.send_if_modified(|s| {
        let (changed, pending) = reconcile_event(s, &inner.article_id, event);
        author = pending;
        changed
    });
    author
}

/// Reconcile one event into `s`. Returns whether anything changed and, for a
/// newly appended comment, the author still to resolve.
fn reconcile_event(
    s: &mut ThreadState,
    article_id: &ArticleId,
    event: &ChangeEvent,
) -> (bool, Option<UserId>) {
    match event.kind {
        ChangeKind::Insert => {
            let Some(comment) = event.decode_new::<Comment>() else {
                return (false, None);
            };
            if &comment.article_id != article_id
                || s.comments.iter().any(|c| c.key() == comment.id.as_str())
            {
                return (false, None);
            }
            let user_id = comment.user_id.clone();
            s.comments.push(CommentWithAuthor::new(comment, None));
            (true, Some(user_id))
        }
        ChangeKind::Update => match event.decode_new::<Comment>() {
            Some(comment) => {
                s.merge(comment);
                (true, None)
            }
            None => (false, None),
        },
        ChangeKind::Delete => match event.record_id() {
            Some(id) => (reconcile::remove(&mut s.comments, id), None),
            None => (false, None),
        },
    }
}

async fn resolve_author(inner: &Inner, user_id: &UserId) {
    match get_user_profile(inner.gateway.as_ref(), user_id).await {
        Ok(Some(profile)) => {
            let author = AuthorProfile::from(&profile);
            inner.state.send_modify(|s| s.set_author(user_id, &author));
        }
        Ok(None) => debug!(user_id = %user_id, "Comment author has no profile"),
        Err(e) => warn!(user_id = %user_id, error = %e, "Author lookup failed"),
    }
}

impl std::fmt::Debug for CommentThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommentThread")
            .field("article_id", &self.inner.article_id)
            .field("comments", &self.inner.state.borrow().comments.len())
            .finish_non_exhaustive()
    }
}
