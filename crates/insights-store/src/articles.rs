//! The article collection store.

use crate::reconcile::{self, Placement};
use crate::state::{LoadState, StoreFailure};
use insights_accessors::{self as accessors, ArticleDraft};
use insights_gateway::{Gateway, GatewayResult};
use insights_model::{paginate, tables, Article, ArticleId, Keyed, Page};
use insights_realtime::{
    ChangeEvent, ChangeFeed, ChangeHandler, ChangeKind, ChannelSpec, RealtimeResult, Subscription,
};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Channel key for article changes.
pub const ARTICLES_CHANNEL: &str = "blogs-changes";

/// Observable article state.
///
/// `articles` is ordered newest first. Search, tag and page are view
/// parameters; the filtered and paginated lists are derived on demand.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArticlesState {
    pub load: LoadState,
    pub articles: Vec<Article>,
    pub featured: Vec<Article>,
    /// Article focused by a detail view.
    pub current: Option<Article>,
    /// Cleared by the next successful fetch.
    pub error: Option<StoreFailure>,
    pub search: String,
    pub tag: Option<String>,
    /// 1-indexed.
    pub page: usize,
    pub page_size: usize,
    /// Whether the collection holds published articles only.
    pub published_only: bool,
}

impl ArticlesState {
    fn new(page_size: usize) -> Self {
        Self {
            load: LoadState::Idle,
            articles: Vec::new(),
            featured: Vec::new(),
            current: None,
            error: None,
            search: String::new(),
            tag: None,
            page: 1,
            page_size,
            published_only: true,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.load == LoadState::Loading
    }

    /// Articles matching the search term and selected tag.
    pub fn filtered(&self) -> Vec<Article> {
        self.articles
            .iter()
            .filter(|a| a.matches_search(&self.search))
            .filter(|a| self.tag.as_deref().map_or(true, |tag| a.has_tag(tag)))
            .cloned()
            .collect()
    }

    /// The current page of the filtered articles.
    pub fn page_view(&self) -> Page<Article> {
        paginate(&self.filtered(), self.page, self.page_size)
    }

    /// Every tag in the collection, sorted and deduplicated.
    pub fn all_tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = self
            .articles
            .iter()
            .flat_map(|a| a.tags.iter().cloned())
            .collect();
        tags.sort();
        tags.dedup();
        tags
    }

    fn visible(&self, article: &Article) -> bool {
        !self.published_only || article.published
    }

    fn upsert(&mut self, article: Article, featured_limit: usize) {
        if self.visible(&article) {
            reconcile::upsert(&mut self.articles, article.clone(), Placement::Front);
        } else {
            reconcile::remove(&mut self.articles, article.key());
        }

        if article.published && article.featured {
            reconcile::upsert(&mut self.featured, article.clone(), Placement::Front);
            self.featured.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            self.featured.truncate(featured_limit);
        } else {
            reconcile::remove(&mut self.featured, article.key());
        }

        if let Some(current) = self.current.as_mut().filter(|c| c.id == article.id) {
            *current = article;
        }
    }

    fn remove(&mut self, id: &str) {
        reconcile::remove(&mut self.articles, id);
        reconcile::remove(&mut self.featured, id);
        if self.current.as_ref().is_some_and(|c| c.key() == id) {
            self.current = None;
        }
    }

    /// Apply one change event.
    fn apply(&mut self, event: &ChangeEvent, featured_limit: usize) {
        match event.kind {
            ChangeKind::Insert | ChangeKind::Update => match event.decode_new::<Article>() {
                Some(article) => self.upsert(article, featured_limit),
                None => warn!(kind = ?event.kind, "Ignoring article change without a readable row"),
            },
            ChangeKind::Delete => match event.record_id() {
                Some(id) => self.remove(id),
                None => warn!("Ignoring article delete without an id"),
            },
        }
    }
}

struct Inner {
    gateway: Arc<dyn Gateway>,
    state: watch::Sender<ArticlesState>,
    list_generation: AtomicU64,
    current_generation: AtomicU64,
    /// Events applied while a collection fetch is in flight, replayed over
    /// its result.
    in_flight: Mutex<Option<Vec<ChangeEvent>>>,
    featured_limit: usize,
}

impl Inner {
    fn apply(&self, event: &ChangeEvent) {
        let mut in_flight = self.in_flight.lock();
        if let Some(events) = in_flight.as_mut() {
            events.push(event.clone());
        }
        let limit = self.featured_limit;
        self.state.send_modify(|s| s.apply(event, limit));
    }
}

/// Article store. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ArticleStore {
    inner: Arc<Inner>,
}

impl ArticleStore {
    pub fn new(gateway: Arc<dyn Gateway>, page_size: usize, featured_limit: usize) -> Self {
        let (state, _) = watch::channel(ArticlesState::new(page_size));
        Self {
            inner: Arc::new(Inner {
                gateway,
                state,
                list_generation: AtomicU64::new(0),
                current_generation: AtomicU64::new(0),
                in_flight: Mutex::new(None),
                featured_limit,
            }),
        }
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> ArticlesState {
        self.inner.state.borrow().clone()
    }

    /// Receiver notified on every state change.
    pub fn watch(&self) -> watch::Receiver<ArticlesState> {
        self.inner.state.subscribe()
    }

    fn update(&self, f: impl FnOnce(&mut ArticlesState)) {
        self.inner.state.send_modify(f);
    }

    /// Load the collection, newest first.
    ///
    /// A failure is recorded in `error` and the previous collection is kept.
    /// When another fetch starts before this one completes, this result is
    /// dropped. Change events applied while the fetch is in flight are
    /// replayed over the fetched rows.
    pub async fn fetch_articles(&self, published_only: bool) {
        let generation = {
            let mut in_flight = self.inner.in_flight.lock();
            *in_flight = Some(Vec::new());
            self.inner.list_generation.fetch_add(1, Ordering::SeqCst) + 1
        };
        self.update(|s| {
            s.load = LoadState::Loading;
            s.published_only = published_only;
        });

        let result = accessors::fetch_articles(self.inner.gateway.as_ref(), published_only).await;
        let mut in_flight = self.inner.in_flight.lock();
        if self.inner.list_generation.load(Ordering::SeqCst) != generation {
            debug!(generation, "Dropping superseded article fetch");
            return;
        }
        let missed = in_flight.take().unwrap_or_default();

        match result {
            Ok(articles) => {
                debug!(
                    count = articles.len(),
                    replayed = missed.len(),
                    published_only,
                    "Articles loaded"
                );
                let limit = self.inner.featured_limit;
                self.update(|s| {
                    s.articles = articles;
                    for event in &missed {
                        s.apply(event, limit);
                    }
                    s.load = LoadState::Ready;
                    s.error = None;
                });
            }
            Err(e) => {
                error!(error = %e, "Failed to fetch articles");
                self.update(|s| {
                    s.load = LoadState::Errored;
                    s.error = Some(StoreFailure::from(&e));
                });
            }
        }
    }

    /// Repeat the last collection fetch.
    pub async fn retry(&self) {
        let published_only = self.inner.state.borrow().published_only;
        self.fetch_articles(published_only).await;
    }

    /// Load the featured list. Failures empty the list without touching the
    /// collection or its error.
    pub async fn fetch_featured(&self) {
        let limit = self.inner.featured_limit;
        match accessors::fetch_featured(self.inner.gateway.as_ref(), limit).await {
            Ok(featured) => self.update(|s| s.featured = featured),
            Err(e) => {
                warn!(error = %e, "Failed to fetch featured articles");
                self.update(|s| s.featured.clear());
            }
        }
    }

    /// Focus the article with `slug`.
    pub async fn fetch_by_slug(&self, slug: &str) {
        let slug = slug.to_string();
        self.fetch_current(
            |current| current.slug == slug,
            accessors::fetch_by_slug(self.inner.gateway.as_ref(), &slug),
        )
        .await;
    }

    /// Focus the article with `id`.
    pub async fn fetch_by_id(&self, id: &ArticleId) {
        self.fetch_current(
            |current| &current.id == id,
            accessors::fetch_by_id(self.inner.gateway.as_ref(), id),
        )
        .await;
    }

    async fn fetch_current(
        &self,
        same_target: impl Fn(&Article) -> bool,
        fetch: impl std::future::Future<Output = GatewayResult<Article>>,
    ) {
        let generation = self.inner.current_generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.update(|s| s.load = LoadState::Loading);

        let result = fetch.await;
        if self.inner.current_generation.load(Ordering::SeqCst) != generation {
            debug!(generation, "Dropping superseded article lookup");
            return;
        }

        match result {
            Ok(article) => self.update(|s| {
                s.current = Some(article);
                s.load = LoadState::Ready;
                s.error = None;
            }),
            Err(e) => {
                if e.is_not_found() {
                    debug!("Article not found");
                } else {
                    error!(error = %e, "Failed to fetch article");
                }
                self.update(|s| {
                    if !s.current.as_ref().is_some_and(&same_target) {
                        s.current = None;
                    }
                    s.load = LoadState::Errored;
                    s.error = Some(StoreFailure::from(&e));
                });
            }
        }
    }

    /// Drop the focused article.
    pub fn clear_current(&self) {
        self.inner.current_generation.fetch_add(1, Ordering::SeqCst);
        self.update(|s| s.current = None);
    }

    /// Set the search term and return to page 1.
    pub fn set_search(&self, term: impl Into<String>) {
        let term = term.into();
        self.update(|s| {
            s.search = term;
            s.page = 1;
        });
    }

    /// Select a tag (or none) and return to page 1.
    pub fn set_tag(&self, tag: Option<String>) {
        self.update(|s| {
            s.tag = tag;
            s.page = 1;
        });
    }

    /// Show page `page` (1-indexed; 0 is treated as 1).
    pub fn set_page(&self, page: usize) {
        self.update(|s| s.page = page.max(1));
    }

    /// Reconcile one change event into the state.
    pub fn apply_event(&self, event: &ChangeEvent) {
        self.inner.apply(event);
    }

    /// Follow article changes on `feed` until the returned handle is closed.
    pub fn subscribe(&self, feed: &dyn ChangeFeed) -> RealtimeResult<Subscription> {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let handler: ChangeHandler = Arc::new(move |event: ChangeEvent| {
            if let Some(inner) = weak.upgrade() {
                inner.apply(&event);
            }
        });
        feed.subscribe(ChannelSpec::table(ARTICLES_CHANNEL, tables::ARTICLES), handler)
    }

    /// Create an article and add it to the state.
    pub async fn create(&self, draft: &ArticleDraft) -> GatewayResult<Article> {
        let article = accessors::create_article(self.inner.gateway.as_ref(), draft).await?;
        self.upsert_local(article.clone());
        Ok(article)
    }

    /// Replace an article's editable fields.
    pub async fn edit(&self, id: &ArticleId, draft: &ArticleDraft) -> GatewayResult<Article> {
        let article = accessors::update_article(self.inner.gateway.as_ref(), id, draft).await?;
        self.upsert_local(article.clone());
        Ok(article)
    }

    pub async fn set_published(&self, id: &ArticleId, published: bool) -> GatewayResult<Article> {
        let article = accessors::set_published(self.inner.gateway.as_ref(), id, published).await?;
        info!(id = %id, published, "Article publication changed");
        self.upsert_local(article.clone());
        Ok(article)
    }

    pub async fn set_featured(&self, id: &ArticleId, featured: bool) -> GatewayResult<Article> {
        let article = accessors::set_featured(self.inner.gateway.as_ref(), id, featured).await?;
        self.upsert_local(article.clone());
        Ok(article)
    }

    pub async fn delete(&self, id: &ArticleId) -> GatewayResult<()> {
        accessors::delete_article(self.inner.gateway.as_ref(), id).await?;
        self.update(|s| s.remove(id.as_str()));
        Ok(())
    }

    fn upsert_local(&self, article: Article) {
        let limit = self.inner.featured_limit;
        self.update(|s| s.upsert(article, limit));
    }
}

impl std::fmt::Debug for ArticleStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("ArticleStore")
            .field("load", &state.load)
            .field("articles", &state.articles.len())
            .finish_non_exhaustive()
    }
}
