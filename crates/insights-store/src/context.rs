//! Process-wide application context.

use crate::mock::{seed_accounts, seed_gateway};
use crate::{ArticleStore, AuthStore, CommentThread, ContextResult, LikeState};
use insights_auth::{AuthResult, AuthService, MemoryAuth, SupabaseAuth};
use insights_config::Config;
use insights_gateway::{
    Gateway, MemoryGateway, MemoryStorage, ObjectStorage, SupabaseGateway, SupabaseStorage,
};
use insights_model::{ArticleId, AuthUser};
use insights_realtime::{
    ChangeFeed, LocalChangeFeed, RealtimeConfig, Subscription, SubscriptionSet, SupabaseRealtime,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::info;

/// Which backend the context talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// The configured hosted project.
    Hosted,
    /// In-memory services seeded with sample content.
    Mock,
}

/// Shared client state (cheap to clone).
///
/// Built once per process from the configuration and passed to whatever
/// needs the backend or the stores. [`shutdown`](Self::shutdown) releases
/// every tracked realtime subscription and stops background tasks.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub gateway: Arc<dyn Gateway>,
    pub storage: Arc<dyn ObjectStorage>,
    pub feed: Arc<dyn ChangeFeed>,
    pub auth_service: Arc<dyn AuthService>,
    /// The article collection, featured list and current article.
    pub articles: ArticleStore,
    /// Session, user and admin flag.
    pub auth: AuthStore,
    subscriptions: Arc<Mutex<SubscriptionSet>>,
    backend: Backend,
    realtime: Option<Arc<SupabaseRealtime>>,
}

impl AppContext {
    /// Connect to the hosted backend when one is configured, otherwise run
    /// in mock mode.
    ///
    /// Must be called inside a tokio runtime: the hosted realtime client
    /// spawns its connection task immediately.
    pub fn from_config(config: Config) -> ContextResult<Self> {
        if !config.is_backend_configured() {
            info!("No backend configured, using sample content");
            return Self::mock(config);
        }

        let url = config.supabase_url()?;
        let key = config.anon_key()?.to_string();
        info!(url = %url, "Connecting to hosted backend");

        let gateway = Arc::new(SupabaseGateway::new(url.clone(), key.clone()));
        let storage = Arc::new(SupabaseStorage::new(url.clone(), key.clone()));
        let realtime = Arc::new(SupabaseRealtime::connect(
            RealtimeConfig::for_project(&url, &key, &config.realtime)?,
            None,
        ));
        let auth_service = Arc::new(SupabaseAuth::new(&url, key)?);

        Ok(Self::assemble(
            config,
            Backend::Hosted,
            gateway,
            storage,
            realtime.clone(),
            auth_service,
            Some(realtime),
        ))
    }

    /// In-memory backend seeded with the sample articles and demo accounts.
    pub fn mock(config: Config) -> ContextResult<Self> {
        let feed = Arc::new(LocalChangeFeed::new());
        let gateway = MemoryGateway::provisioned().with_change_feed(feed.clone());
        seed_gateway(&gateway)?;
        let auth_service = MemoryAuth::new();
        seed_accounts(&auth_service);

        Ok(Self::assemble(
            config,
            Backend::Mock,
            Arc::new(gateway),
            Arc::new(MemoryStorage::new()),
            feed,
            Arc::new(auth_service),
            None,
        ))
    }

    /// Wire explicit services together, e.g. test doubles.
    pub fn with_services(
        config: Config,
        gateway: Arc<dyn Gateway>,
        storage: Arc<dyn ObjectStorage>,
        feed: Arc<dyn ChangeFeed>,
        auth_service: Arc<dyn AuthService>,
    ) -> Self {
        Self::assemble(config, Backend::Mock, gateway, storage, feed, auth_service, None)
    }

    fn assemble(
        config: Config,
        backend: Backend,
        gateway: Arc<dyn Gateway>,
        storage: Arc<dyn ObjectStorage>,
        feed: Arc<dyn ChangeFeed>,
        auth_service: Arc<dyn AuthService>,
        realtime: Option<Arc<SupabaseRealtime>>,
    ) -> Self {
        let articles = ArticleStore::new(gateway.clone(), config.page_size, config.featured_limit);
        let auth = AuthStore::with_change_feed(auth_service.clone(), gateway.clone(), feed.clone());
        Self {
            config: Arc::new(config),
            gateway,
            storage,
            feed,
            auth_service,
            articles,
            auth,
            subscriptions: Arc::new(Mutex::new(SubscriptionSet::new())),
            backend,
            realtime,
        }
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    /// Resolve the current session and start following session changes.
    pub async fn initialize(&self) {
        self.auth.initialize().await;
        self.sync_storage_token();
    }

    /// Sign in and authorize uploads as the new user.
    pub async fn sign_in(&self, email: &str, password: &str) -> AuthResult<AuthUser> {
        let user = self.auth.sign_in(email, password).await?;
        self.sync_storage_token();
        Ok(user)
    }

    pub async fn sign_out(&self) -> AuthResult<()> {
        self.auth.sign_out().await?;
        self.sync_storage_token();
        Ok(())
    }

    fn sync_storage_token(&self) {
        let token = self.auth.snapshot().session.map(|s| s.access_token);
        self.storage.set_access_token(token);
    }

    /// Keep the article store in sync with article change events until
    /// shutdown.
    pub fn watch_articles(&self) -> ContextResult<()> {
        let subscription = self.articles.subscribe(self.feed.as_ref())?;
        self.track(subscription);
        Ok(())
    }

    /// Like state for one article as the current user.
    pub fn like_state(&self, article_id: ArticleId) -> LikeState {
        let user = self.auth.snapshot().user.map(|u| u.id);
        LikeState::new(self.gateway.clone(), article_id, user)
    }

    pub fn comment_thread(&self, article_id: ArticleId) -> CommentThread {
        CommentThread::new(self.gateway.clone(), article_id)
    }

    /// Release `subscription` together with the context.
    pub fn track(&self, subscription: Subscription) {
        self.subscriptions.lock().push(subscription);
    }

    /// Number of subscriptions released by [`shutdown`](Self::shutdown).
    pub fn tracked_subscriptions(&self) -> usize {
        self.subscriptions.lock().len()
    }

    /// Release every tracked subscription, stop the session listener and
    /// close the realtime connection.
    pub fn shutdown(&self) {
        let released = {
            let mut subscriptions = self.subscriptions.lock();
            let count = subscriptions.len();
            subscriptions.close_all();
            count
        };
        self.auth.shutdown();
        if let Some(realtime) = &self.realtime {
            realtime.shutdown();
        }
        info!(released, backend = ?self.backend, "Application context shut down");
    }
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("backend", &self.backend)
            .field("subscriptions", &self.tracked_subscriptions())
            .finish_non_exhaustive()
    }
}
