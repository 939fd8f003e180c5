//! Hosted `/auth/v1` implementation.

use crate::auth_fsm::{AuthMachine, AuthMachineInput, AuthState, RefreshConfig};
use crate::service::EVENT_CHANNEL_CAPACITY;
use crate::{AuthError, AuthResult, AuthService, OAuthProvider, SessionEvent};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use insights_model::{AuthUser, Session, UserId};
use parking_lot::{Mutex, RwLock};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use url::Url;

/// Token endpoint response (password and refresh grants).
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
    #[serde(default)]
    expires_at: Option<i64>,
    user: TokenUser,
}

#[derive(Debug, Deserialize)]
struct TokenUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

impl TokenResponse {
    fn into_session(self) -> Session {
        let expires_at = self
            .expires_at
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .unwrap_or_else(|| Utc::now() + Duration::seconds(self.expires_in));
        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            user: AuthUser {
                id: UserId::from_string(self.user.id),
                email: self.user.email,
            },
        }
    }
}

#[derive(Serialize)]
struct PasswordGrant<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RefreshGrant<'a> {
    refresh_token: &'a str,
}

/// Hosted authentication client.
///
/// The machine tracks transient states (logging in, refreshing, logging out);
/// the session itself lives in memory for the life of the client.
pub struct SupabaseAuth {
    http_client: Client,
    auth_url: Url,
    anon_key: String,
    fsm: Mutex<AuthMachine>,
    session: RwLock<Option<Session>>,
    refresh_config: RefreshConfig,
    events: broadcast::Sender<SessionEvent>,
}

impl SupabaseAuth {
    /// Create a client for the project at `project_url`.
    pub fn new(project_url: &Url, anon_key: impl Into<String>) -> AuthResult<Self> {
        Self::with_refresh_config(project_url, anon_key, RefreshConfig::default())
    }

    /// Create a client with custom refresh retry behaviour.
    pub fn with_refresh_config(
        project_url: &Url,
        anon_key: impl Into<String>,
        refresh_config: RefreshConfig,
    ) -> AuthResult<Self> {
        let mut base = project_url.clone();
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            http_client: Client::new(),
            auth_url: base.join("auth/v1/")?,
            anon_key: anon_key.into(),
            fsm: Mutex::new(AuthMachine::new()),
            session: RwLock::new(None),
            refresh_config,
            events,
        })
    }

    /// Current machine state.
    pub fn state(&self) -> AuthState {
        AuthState::from(self.fsm.lock().state())
    }

    /// Adopt a session obtained elsewhere (an OAuth redirect, a saved session).
    pub fn restore_session(&self, session: Session) -> AuthResult<()> {
        self.transition(&AuthMachineInput::SessionRestored)?;
        info!(user_id = %session.user.id, "Session restored");
        *self.session.write() = Some(session.clone());
        self.emit(SessionEvent::signed_in(session));
        Ok(())
    }

    /// Exchange the refresh token for a new session, with backoff on
    /// transient failures.
    pub async fn refresh_session(&self) -> AuthResult<Session> {
        let refresh_token = self
            .session
            .read()
            .as_ref()
            .map(|s| s.refresh_token.clone())
            .ok_or(AuthError::NotLoggedIn)?;

        self.transition(&AuthMachineInput::TokenExpired)?;
        self.refresh_with_backoff(&refresh_token).await
    }

    fn transition(&self, input: &AuthMachineInput) -> AuthResult<AuthState> {
        let mut fsm = self.fsm.lock();
        let old_state = AuthState::from(fsm.state());

        fsm.consume(input).map_err(|_| {
            AuthError::InvalidStateTransition(format!(
                "Cannot apply {:?} in state {:?}",
                input,
                fsm.state()
            ))
        })?;

        let new_state = AuthState::from(fsm.state());
        if old_state != new_state {
            debug!(old_state = ?old_state, new_state = ?new_state, "Auth state transition");
        }
        Ok(new_state)
    }

    fn emit(&self, event: SessionEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    fn clear_session(&self) -> bool {
        self.session.write().take().is_some()
    }

    async fn refresh_with_backoff(&self, refresh_token: &str) -> AuthResult<Session> {
        let mut last_error = None;

        for attempt in 0..self.refresh_config.max_retries {
            match self.try_refresh(refresh_token).await {
                Ok(session) => {
                    self.transition(&AuthMachineInput::RefreshSuccess)?;
                    info!(user_id = %session.user.id, "Token refreshed successfully");
                    *self.session.write() = Some(session.clone());
                    self.emit(SessionEvent::refreshed(session.clone()));
                    return Ok(session);
                }
                Err(e) if e.is_transient() => {
                    last_error = Some(e);

                    if attempt + 1 < self.refresh_config.max_retries {
                        let _ = self.transition(&AuthMachineInput::RefreshRetry);

                        let delay = self.refresh_config.delay_for_attempt(attempt);
                        debug!(
                            attempt = attempt + 1,
                            max_retries = self.refresh_config.max_retries,
                            delay_ms = delay.as_millis() as u64,
                            "Refresh failed with transient error, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Refresh failed with non-transient error");
                    self.fail_refresh()?;
                    return Err(e);
                }
            }
        }

        warn!(
            attempts = self.refresh_config.max_retries,
            "Refresh failed after retries"
        );
        self.fail_refresh()?;
        Err(last_error.unwrap_or(AuthError::RefreshExhausted(self.refresh_config.max_retries)))
    }

    fn fail_refresh(&self) -> AuthResult<()> {
        self.clear_session();
        self.transition(&AuthMachineInput::RefreshFailed)?;
        self.emit(SessionEvent::signed_out());
        Ok(())
    }

    async fn try_refresh(&self, refresh_token: &str) -> AuthResult<Session> {
        let url = self.token_url("refresh_token")?;
        debug!(url = %url, "Refreshing token");
        let response = self
            .http_client
            .post(url)
            .header("apikey", &self.anon_key)
            .json(&RefreshGrant { refresh_token })
            .send()
            .await?;

        let response = check_response(response, "Token refresh").await.map_err(|e| match e {
            AuthError::Server { status } if status < 500 => {
                AuthError::TokenRefresh(format!("HTTP {status}"))
            }
            other => other,
        })?;
        Ok(response.json::<TokenResponse>().await?.into_session())
    }

    fn token_url(&self, grant_type: &str) -> AuthResult<Url> {
        let mut url = self.auth_url.join("token")?;
        url.query_pairs_mut().append_pair("grant_type", grant_type);
        Ok(url)
    }

    async fn password_grant(&self, email: &str, password: &str) -> AuthResult<Session> {
        let url = self.token_url("password")?;
        debug!(url = %url, email = %email, "Attempting email/password login");

        let response = self
            .http_client
            .post(url)
            .header("apikey", &self.anon_key)
            .json(&PasswordGrant { email, password })
            .send()
            .await?;

        let response = check_response(response, "Login").await.map_err(|e| match e {
            AuthError::Server { status } if status == 400 || status == 401 => {
                AuthError::InvalidCredentials(format!("HTTP {status}"))
            }
            other => other,
        })?;
        Ok(response.json::<TokenResponse>().await?.into_session())
    }
}

/// Pass successful responses through; log and classify the rest.
async fn check_response(response: Response, operation: &str) -> AuthResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body_len = response.text().await.map(|b| b.len()).unwrap_or_default();
    warn!(status = %status, body_len, "{operation} failed");
    Err(AuthError::Server {
        status: status.as_u16(),
    })
}

#[async_trait]
impl AuthService for SupabaseAuth {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> AuthResult<Session> {
        self.transition(&AuthMachineInput::LoginAttempt)?;

        match self.password_grant(email, password).await {
            Ok(session) => {
                self.transition(&AuthMachineInput::LoginSuccess)?;
                *self.session.write() = Some(session.clone());
                info!(user_id = %session.user.id, "Login successful");
                self.emit(SessionEvent::signed_in(session.clone()));
                Ok(session)
            }
            Err(e) => {
                self.transition(&AuthMachineInput::LoginFailed)?;
                if self.clear_session() {
                    self.emit(SessionEvent::signed_out());
                }
                Err(e)
            }
        }
    }

    async fn sign_out(&self) -> AuthResult<()> {
        let Some(session) = self.session.read().clone() else {
            return Ok(());
        };
        let _ = self.transition(&AuthMachineInput::LogoutRequested);

        let revoke = async {
            let url = self.auth_url.join("logout")?;
            let response = self
                .http_client
                .post(url)
                .header("apikey", &self.anon_key)
                .bearer_auth(&session.access_token)
                .send()
                .await?;
            // An already revoked token is as good as a successful logout.
            if response.status() != StatusCode::UNAUTHORIZED {
                check_response(response, "Logout").await?;
            }
            Ok::<(), AuthError>(())
        };
        if let Err(e) = revoke.await {
            warn!(error = %e, "Server-side logout failed, clearing local session anyway");
        }

        self.clear_session();
        let _ = self.transition(&AuthMachineInput::LogoutComplete);
        info!(user_id = %session.user.id, "Logged out");
        self.emit(SessionEvent::signed_out());
        Ok(())
    }

    async fn get_session(&self) -> AuthResult<Option<Session>> {
        let current = self.session.read().clone();
        match current {
            Some(session) if session.is_expired() => {
                info!(user_id = %session.user.id, "Session expired, attempting refresh");
                self.refresh_session().await.map(Some)
            }
            other => Ok(other),
        }
    }

    fn on_session_change(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    fn oauth_authorize_url(&self, provider: OAuthProvider, redirect_to: &str) -> AuthResult<Url> {
        let mut url = self.auth_url.join("authorize")?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("provider", provider.as_str());
            query.append_pair("redirect_to", redirect_to);
            query.extend_pairs(provider.query_params());
        }
        Ok(url)
    }
}

impl std::fmt::Debug for SupabaseAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseAuth")
            .field("auth_url", &self.auth_url.as_str())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SessionEventKind;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    fn project() -> Url {
        Url::parse("https://abc.supabase.co").unwrap()
    }

    fn expired_session() -> Session {
        Session {
            access_token: "stale".to_string(),
            refresh_token: "refresh-1".to_string(),
            expires_at: Utc::now() - Duration::minutes(5),
            user: AuthUser {
                id: UserId::from_string("u1"),
                email: None,
            },
        }
    }

    /// Answer a single HTTP request with `status` and `body`, returning the
    /// raw request text.
    async fn serve_once(status: &'static str, body: String) -> (Url, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = Url::parse(&format!("http://{}", listener.local_addr().unwrap())).unwrap();
        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = stream.read(&mut buf).await.unwrap();
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request).to_string();
                if let Some(end) = text.find("\r\n\r\n") {
                    let content_length = text[..end]
                        .lines()
                        .find_map(|l| {
                            let (name, value) = l.split_once(':')?;
                            name.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().unwrap())
                        })
                        .unwrap_or(0);
                    if request.len() >= end + 4 + content_length {
                        break;
                    }
                }
                if n == 0 {
                    break;
                }
            }
            let response = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.unwrap();
            String::from_utf8_lossy(&request).to_string()
        });
        (url, handle)
    }

    #[test]
    fn authorize_url_carries_provider_params() {
        let auth = SupabaseAuth::new(&project(), "anon").unwrap();
        let url = auth
            .oauth_authorize_url(OAuthProvider::Google, "https://myrightwindow.com/blogs")
            .unwrap();
        assert_eq!(url.path(), "/auth/v1/authorize");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("provider".into(), "google".into())));
        assert!(pairs.contains(&("redirect_to".into(), "https://myrightwindow.com/blogs".into())));
        assert!(pairs.contains(&("access_type".into(), "offline".into())));
        assert!(pairs.contains(&("prompt".into(), "consent".into())));
    }

    #[test]
    fn token_response_prefers_absolute_expiry() {
        let response: TokenResponse = serde_json::from_value(serde_json::json!({
            "access_token": "a", "refresh_token": "r", "expires_in": 3600,
            "expires_at": 1_900_000_000, "user": {"id": "u1", "email": "a@b.c"}
        }))
        .unwrap();
        let session = response.into_session();
        assert_eq!(session.expires_at.timestamp(), 1_900_000_000);
        assert_eq!(session.user.email.as_deref(), Some("a@b.c"));
    }

    #[tokio::test]
    async fn password_sign_in_stores_session_and_notifies() {
        let body = serde_json::json!({
            "access_token": "tok", "refresh_token": "ref", "expires_in": 3600,
            "user": {"id": "u1", "email": "admin@myrightwindow.com"}
        })
        .to_string();
        let (url, server) = serve_once("200 OK", body).await;
        let auth = SupabaseAuth::new(&url, "anon").unwrap();
        let mut events = auth.on_session_change();

        let session = auth
            .sign_in_with_password("admin@myrightwindow.com", "secret")
            .await
            .unwrap();
        assert_eq!(session.user.id.as_str(), "u1");
        assert_eq!(auth.state(), AuthState::LoggedIn);
        assert_eq!(auth.get_session().await.unwrap(), Some(session));
        assert_eq!(events.recv().await.unwrap().kind, SessionEventKind::SignedIn);

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /auth/v1/token?grant_type=password"));
        assert!(request.to_ascii_lowercase().contains("apikey: anon"));
    }

    #[tokio::test]
    async fn rejected_password_is_invalid_credentials() {
        let (url, _server) =
            serve_once("400 Bad Request", r#"{"error":"invalid_grant"}"#.to_string()).await;
        let auth = SupabaseAuth::new(&url, "anon").unwrap();

        let err = auth.sign_in_with_password("a@b.c", "wrong").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials(_)));
        assert_eq!(auth.state(), AuthState::NotLoggedIn);
        assert_eq!(auth.get_session().await.unwrap(), None);
    }

    #[tokio::test]
    async fn unreachable_refresh_retries_then_signs_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let url = Url::parse(&format!("http://{addr}")).unwrap();
        let config = RefreshConfig {
            max_retries: 2,
            initial_delay_ms: 1,
            max_delay_ms: 2,
        };
        let auth = SupabaseAuth::with_refresh_config(&url, "anon", config).unwrap();
        auth.restore_session(expired_session()).unwrap();
        let mut events = auth.on_session_change();

        let err = auth.get_session().await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(auth.state(), AuthState::NotLoggedIn);
        assert_eq!(events.recv().await.unwrap().kind, SessionEventKind::SignedOut);
        assert_eq!(auth.get_session().await.unwrap(), None);
    }

    #[tokio::test]
    async fn sign_out_without_session_is_a_no_op() {
        let auth = SupabaseAuth::new(&project(), "anon").unwrap();
        auth.sign_out().await.unwrap();
        assert_eq!(auth.state(), AuthState::NotLoggedIn);
    }

    #[test]
    fn debug_output_hides_key() {
        let auth = SupabaseAuth::new(&project(), "very-secret").unwrap();
        assert!(!format!("{auth:?}").contains("very-secret"));
    }
}
