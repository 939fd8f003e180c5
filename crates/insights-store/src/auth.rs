//! Auth sub-store: session, user and admin flag.

use insights_accessors::get_user_role;
use insights_auth::{AuthResult, AuthService};
use insights_gateway::Gateway;
use insights_model::{AuthUser, Role, Session};
use insights_realtime::ChangeFeed;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Observable authentication state.
///
/// `session`, `user` and `is_admin` always describe the same session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthState {
    #[serde(skip)]
    pub session: Option<Session>,
    pub user: Option<AuthUser>,
    pub is_admin: bool,
    /// True until the first session lookup finishes.
    pub is_loading: bool,
}

impl Default for AuthState {
    fn default() -> Self {
        Self {
            session: None,
            user: None,
            is_admin: false,
            is_loading: true,
        }
    }
}

impl AuthState {
    pub fn is_signed_in(&self) -> bool {
        self.user.is_some()
    }

    /// Signed in with the admin role.
    pub fn can_access_admin(&self) -> bool {
        self.user.is_some() && self.is_admin
    }
}

struct Inner {
    auth: Arc<dyn AuthService>,
    gateway: Arc<dyn Gateway>,
    feed: Option<Arc<dyn ChangeFeed>>,
    state: watch::Sender<AuthState>,
    next_ticket: AtomicU64,
    applied_ticket: AtomicU64,
    listener: Mutex<Option<JoinHandle<()>>>,
}

/// Tracks the authentication service and the signed-in user's role.
///
/// Every resolution takes a ticket when it starts; a resolution that finishes
/// after a later one has been applied is discarded, so a slow role lookup
/// never pairs an old admin flag with a newer user.
#[derive(Clone)]
pub struct AuthStore {
    inner: Arc<Inner>,
}

impl AuthStore {
    pub fn new(auth: Arc<dyn AuthService>, gateway: Arc<dyn Gateway>) -> Self {
        Self::build(auth, gateway, None)
    }

    /// Also forward the session's access token to a change feed.
    pub fn with_change_feed(
        auth: Arc<dyn AuthService>,
        gateway: Arc<dyn Gateway>,
        feed: Arc<dyn ChangeFeed>,
    ) -> Self {
        Self::build(auth, gateway, Some(feed))
    }

    fn build(
        auth: Arc<dyn AuthService>,
        gateway: Arc<dyn Gateway>,
        feed: Option<Arc<dyn ChangeFeed>>,
    ) -> Self {
        let (state, _) = watch::channel(AuthState::default());
        Self {
            inner: Arc::new(Inner {
                auth,
                gateway,
                feed,
                state,
                next_ticket: AtomicU64::new(0),
                applied_ticket: AtomicU64::new(0),
                listener: Mutex::new(None),
            }),
        }
    }

    pub fn snapshot(&self) -> AuthState {
        self.inner.state.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<AuthState> {
        self.inner.state.subscribe()
    }

    /// Resolve the current session once, then follow session changes until
    /// [`shutdown`](Self::shutdown). Calling it again restarts the listener.
    pub async fn initialize(&self) {
        // Subscribe first so no change between lookup and listen is lost.
        let mut changes = self.inner.auth.on_session_change();
        self.refresh().await;

        let inner = Arc::downgrade(&self.inner);
        let listener = tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(event) => debug!(kind = ?event.kind, "Session change"),
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "Session listener lagged, resolving current session")
                    }
                    Err(RecvError::Closed) => break,
                }
                let Some(inner) = inner.upgrade() else {
                    break;
                };
                AuthStore { inner }.refresh().await;
            }
            debug!("Session listener stopped");
        });

        if let Some(previous) = self.inner.listener.lock().replace(listener) {
            previous.abort();
        }
    }

    /// Re-read the session and role and publish them together.
    pub async fn refresh(&self) {
        let ticket = self.inner.next_ticket.fetch_add(1, Ordering::SeqCst) + 1;

        let session = match self.inner.auth.get_session().await {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "Could not read session, treating as signed out");
                None
            }
        };
        let role = match &session {
            Some(_) if self.is_superseded(ticket) => Role::User,
            Some(session) => self.lookup_role(session).await,
            None => Role::User,
        };

        self.publish(ticket, session, role);
    }

    fn is_superseded(&self, ticket: u64) -> bool {
        ticket <= self.inner.applied_ticket.load(Ordering::SeqCst)
    }

    async fn lookup_role(&self, session: &Session) -> Role {
        // The profile read must run as the new user.
        self.inner
            .gateway
            .set_access_token(Some(session.access_token.clone()));
        match get_user_role(self.inner.gateway.as_ref(), &session.user.id).await {
            Ok(role) => role,
            Err(e) => {
                warn!(user_id = %session.user.id, error = %e, "Role lookup failed");
                Role::User
            }
        }
    }

    fn publish(&self, ticket: u64, session: Option<Session>, role: Role) {
        let inner = &self.inner;
        inner.state.send_if_modified(|state| {
            if ticket <= inner.applied_ticket.load(Ordering::SeqCst) {
                debug!(ticket, "Discarding superseded session resolution");
                // The role read may have left this resolution's token behind.
                inner.gateway.set_access_token(
                    state.session.as_ref().map(|s| s.access_token.clone()),
                );
                return false;
            }
            inner.applied_ticket.store(ticket, Ordering::SeqCst);

            let token = session.as_ref().map(|s| s.access_token.clone());
            inner.gateway.set_access_token(token.clone());
            if let Some(feed) = &inner.feed {
                feed.set_access_token(token);
            }

            let next = AuthState {
                user: session.as_ref().map(|s| s.user.clone()),
                is_admin: session.is_some() && role.is_admin(),
                session,
                is_loading: false,
            };
            if *state == next {
                return false;
            }
            *state = next;
            true
        });
    }

    /// Sign in with email and password, then publish the new state.
    pub async fn sign_in(&self, email: &str, password: &str) -> AuthResult<AuthUser> {
        let session = self.inner.auth.sign_in_with_password(email, password).await?;
        info!(user_id = %session.user.id, "Signed in");
        self.refresh().await;
        Ok(session.user)
    }

    /// Sign out and publish the signed-out state.
    pub async fn sign_out(&self) -> AuthResult<()> {
        self.inner.auth.sign_out().await?;
        self.refresh().await;
        Ok(())
    }

    /// Stop following session changes.
    pub fn shutdown(&self) {
        if let Some(listener) = self.inner.listener.lock().take() {
            listener.abort();
        }
    }
}

impl std::fmt::Debug for AuthStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthStore")
            .field("state", &*self.inner.state.borrow())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use insights_auth::{MemoryAuth, OAuthProvider, SessionEvent};
    use insights_gateway::MemoryGateway;
    use insights_model::{tables, UserId};
    use serde_json::json;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;
    use tokio::sync::{broadcast, Notify};
    use url::Url;

    /// Holds the first session read until released.
    struct GatedAuth {
        inner: Arc<MemoryAuth>,
        gated: AtomicBool,
        read: Notify,
        release: Notify,
    }

    #[async_trait]
    impl AuthService for GatedAuth {
        async fn sign_in_with_password(&self, email: &str, password: &str) -> AuthResult<Session> {
            self.inner.sign_in_with_password(email, password).await
        }

        async fn sign_out(&self) -> AuthResult<()> {
            self.inner.sign_out().await
        }

        async fn get_session(&self) -> AuthResult<Option<Session>> {
            let session = self.inner.get_session().await;
            if self.gated.swap(false, Ordering::SeqCst) {
                self.read.notify_one();
                self.release.notified().await;
            }
            session
        }

        fn on_session_change(&self) -> broadcast::Receiver<SessionEvent> {
            self.inner.on_session_change()
        }

        fn oauth_authorize_url(&self, provider: OAuthProvider, redirect_to: &str) -> AuthResult<Url> {
            self.inner.oauth_authorize_url(provider, redirect_to)
        }
    }

    fn setup() -> (Arc<MemoryAuth>, Arc<MemoryGateway>, AuthStore) {
        let auth = Arc::new(MemoryAuth::new());
        auth.add_user("admin@myrightwindow.com", "secret", "admin-1");
        auth.add_user("reader@example.com", "secret", "reader-1");
        let gateway = Arc::new(MemoryGateway::provisioned());
        gateway
            .seed(
                tables::USER_PROFILES,
                vec![
                    json!({"id": "admin-1", "full_name": "Admin", "role": "admin"}),
                    json!({"id": "reader-1", "full_name": "Reader", "role": "user"}),
                ],
            )
            .unwrap();
        let store = AuthStore::new(auth.clone(), gateway.clone());
        (auth, gateway, store)
    }

    async fn settled(store: &AuthStore, user: Option<&str>) -> AuthState {
        let mut rx = store.watch();
        let state = tokio::time::timeout(
            Duration::from_secs(2),
            rx.wait_for(|s| s.user.as_ref().map(|u| u.id.as_str()) == user && !s.is_loading),
        )
        .await
        .expect("auth state did not settle")
        .unwrap()
        .clone();
        state
    }

    #[tokio::test]
    async fn initialize_without_session() {
        let (_auth, _gateway, store) = setup();
        assert!(store.snapshot().is_loading);
        store.initialize().await;
        let state = store.snapshot();
        assert!(!state.is_loading);
        assert!(!state.is_signed_in());
        assert!(!state.can_access_admin());
        store.shutdown();
    }

    #[tokio::test]
    async fn initialize_with_existing_admin_session() {
        let (auth, _gateway, store) = setup();
        auth.sign_in_with_password("admin@myrightwindow.com", "secret")
            .await
            .unwrap();

        store.initialize().await;
        let state = store.snapshot();
        assert_eq!(state.user.unwrap().id, UserId::from_string("admin-1"));
        assert!(state.is_admin);
        store.shutdown();
    }

    #[tokio::test]
    async fn listener_tracks_user_switches() {
        let (auth, gateway, store) = setup();
        store.initialize().await;

        auth.sign_in_with_password("admin@myrightwindow.com", "secret")
            .await
            .unwrap();
        let state = settled(&store, Some("admin-1")).await;
        assert!(state.can_access_admin());

        auth.sign_in_with_password("reader@example.com", "secret")
            .await
            .unwrap();
        let state = settled(&store, Some("reader-1")).await;
        assert!(!state.is_admin);
        assert_eq!(state.session.unwrap().user.id.as_str(), "reader-1");

        auth.sign_out().await.unwrap();
        let state = settled(&store, None).await;
        assert!(!state.is_admin);
        assert!(state.session.is_none());
        assert!(gateway
            .calls()
            .iter()
            .any(|c| c == &format!("read_one {}", tables::USER_PROFILES)));
        store.shutdown();
    }

    #[tokio::test]
    async fn sign_in_and_out_through_the_store() {
        let (_auth, _gateway, store) = setup();
        store.initialize().await;

        let user = store.sign_in("reader@example.com", "secret").await.unwrap();
        assert_eq!(user.id.as_str(), "reader-1");
        assert!(store.snapshot().is_signed_in());

        store.sign_out().await.unwrap();
        assert!(!store.snapshot().is_signed_in());

        assert!(store.sign_in("reader@example.com", "nope").await.is_err());
        assert!(!store.snapshot().is_signed_in());
        store.shutdown();
    }

    #[tokio::test]
    async fn missing_profile_means_plain_user() {
        let (auth, _gateway, store) = setup();
        auth.add_user("new@example.com", "secret", "new-1");
        store.initialize().await;
        store.sign_in("new@example.com", "secret").await.unwrap();
        let state = store.snapshot();
        assert!(state.is_signed_in());
        assert!(!state.is_admin);
        store.shutdown();
    }

    #[tokio::test]
    async fn stale_resolution_is_discarded() {
        let (auth, _gateway, store) = setup();
        auth.sign_in_with_password("admin@myrightwindow.com", "secret")
            .await
            .unwrap();
        let session = auth.get_session().await.unwrap();

        // A resolution that started earlier finishes after a newer one.
        store.publish(2, None, Role::User);
        store.publish(1, session, Role::Admin);
        let state = store.snapshot();
        assert!(state.user.is_none());
        assert!(!state.is_admin);
    }

    #[tokio::test]
    async fn superseded_resolution_leaves_no_token_behind() {
        let (auth, gateway, _) = setup();
        auth.sign_in_with_password("admin@myrightwindow.com", "secret")
            .await
            .unwrap();
        let gated = Arc::new(GatedAuth {
            inner: auth.clone(),
            gated: AtomicBool::new(true),
            read: Notify::new(),
            release: Notify::new(),
        });
        let store = AuthStore::new(gated.clone(), gateway.clone());

        // The first resolution reads the admin session, then stalls.
        let slow = tokio::spawn({
            let store = store.clone();
            async move { store.refresh().await }
        });
        gated.read.notified().await;

        auth.sign_out().await.unwrap();
        store.refresh().await;
        assert!(store.snapshot().user.is_none());

        gated.release.notify_one();
        slow.await.unwrap();
        let state = store.snapshot();
        assert!(state.user.is_none());
        assert!(!state.is_admin);
        assert_eq!(gateway.access_token(), None);
    }

    #[tokio::test]
    async fn discarded_resolution_restores_published_token() {
        let (auth, gateway, store) = setup();
        let session = auth
            .sign_in_with_password("reader@example.com", "secret")
            .await
            .unwrap();
        store.publish(2, Some(session), Role::User);
        assert_eq!(gateway.access_token().as_deref(), Some("reader-1"));

        // An older resolution's role read ran as someone else.
        gateway.set_access_token(Some("admin-1".to_string()));
        store.publish(1, None, Role::User);
        assert_eq!(store.snapshot().user.unwrap().id.as_str(), "reader-1");
        assert_eq!(gateway.access_token().as_deref(), Some("reader-1"));
    }
}
