//! In-process authentication for mock mode and tests.
//!
//! Access tokens are the user id, which is what the in-memory gateway expects
//! as its caller identity.

use crate::service::EVENT_CHANNEL_CAPACITY;
use crate::{AuthError, AuthResult, AuthService, OAuthProvider, SessionEvent};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use insights_model::{AuthUser, Session, UserId};
use parking_lot::RwLock;
use std::collections::HashMap;
use tokio::sync::broadcast;
use tracing::info;
use url::Url;

struct Account {
    password: String,
    user: AuthUser,
}

/// Accounts and the current session, held in memory.
pub struct MemoryAuth {
    accounts: RwLock<HashMap<String, Account>>,
    session: RwLock<Option<Session>>,
    events: broadcast::Sender<SessionEvent>,
}

impl Default for MemoryAuth {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryAuth {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            accounts: RwLock::new(HashMap::new()),
            session: RwLock::new(None),
            events,
        }
    }

    /// Register an account; emails are matched case-insensitively.
    pub fn add_user(&self, email: &str, password: &str, user_id: impl Into<UserId>) -> AuthUser {
        let user = AuthUser {
            id: user_id.into(),
            email: Some(email.to_string()),
        };
        self.accounts.write().insert(
            email.to_lowercase(),
            Account {
                password: password.to_string(),
                user: user.clone(),
            },
        );
        user
    }

    /// Sign in as `user` without a password, as an OAuth redirect would.
    pub fn sign_in_as(&self, user: AuthUser) -> Session {
        let session = session_for(user);
        *self.session.write() = Some(session.clone());
        let _ = self.events.send(SessionEvent::signed_in(session.clone()));
        session
    }
}

fn session_for(user: AuthUser) -> Session {
    Session {
        access_token: user.id.to_string(),
        refresh_token: format!("refresh-{}", user.id),
        expires_at: Utc::now() + Duration::hours(1),
        user,
    }
}

#[async_trait]
impl AuthService for MemoryAuth {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> AuthResult<Session> {
        let user = {
            let accounts = self.accounts.read();
            match accounts.get(&email.to_lowercase()) {
                Some(account) if account.password == password => account.user.clone(),
                _ => {
                    return Err(AuthError::InvalidCredentials(
                        "Invalid login credentials".to_string(),
                    ))
                }
            }
        };
        info!(user_id = %user.id, "Login successful");
        Ok(self.sign_in_as(user))
    }

    async fn sign_out(&self) -> AuthResult<()> {
        if self.session.write().take().is_some() {
            let _ = self.events.send(SessionEvent::signed_out());
        }
        Ok(())
    }

    async fn get_session(&self) -> AuthResult<Option<Session>> {
        Ok(self.session.read().clone())
    }

    fn on_session_change(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    fn oauth_authorize_url(&self, provider: OAuthProvider, redirect_to: &str) -> AuthResult<Url> {
        let mut url = Url::parse("memory://auth/authorize")?;
        url.query_pairs_mut()
            .append_pair("provider", provider.as_str())
            .append_pair("redirect_to", redirect_to)
            .extend_pairs(provider.query_params());
        Ok(url)
    }
}

impl std::fmt::Debug for MemoryAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryAuth")
            .field("accounts", &self.accounts.read().len())
            .field("signed_in", &self.session.read().is_some())
            .finish()
    }
}
