//! # Authenticated Session
//!
//! [`AuthSession`] owns the OAuth2 token state of the signed-in user and
//! executes authenticated HTTP calls on behalf of the remote API client.
//!
//! ## Token lifecycle
//!
//! ```text
//! Unauthenticated --authenticate_with_code/restore--> Authenticated
//! Authenticated --expiry passes--> Expired --refresh_tokens--> Authenticated
//! any --sign_out--> Unauthenticated
//! ```
//!
//! A token set is stored with `expiry = now + expires_in - padding`
//! (5 seconds by default). When the server omits a new refresh token the
//! previous one is kept.
//!
//! ## Retry policy
//!
//! [`AuthSession::authorized_request`] attaches the bearer token and runs the
//! request once. On a status in [`RETRYABLE_STATUSES`] it refreshes the
//! tokens exactly once and replays the request with retry disabled. A
//! transport failure is never retried, and a failed refresh is returned to
//! the caller instead of the original response.
//!
//! API calls go through [`AuthSession::refresh_if_necessary`] first, which
//! renews an expired token once even when several requests race for it.
//! The retry path itself takes no lock. Two concurrent replays may both
//! refresh; whichever token set is stored last is valid.

use crate::error::{AuthError, Result};
use crate::oauth::{OAuthClient, PkceVerifier, TokenResponse};
use crate::session_store::SessionStore;
use crate::types::{AuthState, AuthUser, PersistedSession, SessionRefresh, TokenSet, UserInfo};
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use bridge_traits::time::Clock;
use chrono::Duration as ChronoDuration;
use core_async::sync::{Mutex, RwLock};
use core_runtime::config::{OAuthConfig, ServerEndpoints};
use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Statuses that trigger one refresh-then-retry.
pub const RETRYABLE_STATUSES: [u16; 4] = [401, 403, 404, 500];

const NO_TOKEN_MESSAGE: &str = "No response token found";

pub struct AuthSession {
    http: Arc<dyn HttpClient>,
    oauth: OAuthClient,
    userinfo_url: Url,
    clock: Arc<dyn Clock>,
    expiry_padding: Duration,
    user: RwLock<Option<AuthUser>>,
    pending: Mutex<Option<PkceVerifier>>,
    renewing: Mutex<()>,
    event_bus: Option<EventBus>,
    store: Option<SessionStore>,
}

impl AuthSession {
    pub fn new(
        http: Arc<dyn HttpClient>,
        config: &OAuthConfig,
        endpoints: &ServerEndpoints,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            http,
            oauth: OAuthClient::new(config.clone(), endpoints),
            userinfo_url: endpoints.userinfo_url.clone(),
            clock,
            expiry_padding: config.expiry_padding,
            user: RwLock::new(None),
            pending: Mutex::new(None),
            renewing: Mutex::new(()),
            event_bus: None,
            store: None,
        }
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Persist the session after every sign-in and refresh, and clear it on
    /// sign-out.
    pub fn with_session_store(mut self, store: SessionStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn oauth(&self) -> &OAuthClient {
        &self.oauth
    }

    // ========================================================================
    // State
    // ========================================================================

    pub async fn current_user(&self) -> Option<AuthUser> {
        self.user.read().await.clone()
    }

    pub async fn user_id(&self) -> Option<String> {
        self.user.read().await.as_ref().map(|u| u.id.clone())
    }

    pub async fn tokens(&self) -> Option<TokenSet> {
        self.user.read().await.as_ref().map(|u| u.tokens.clone())
    }

    pub async fn state(&self) -> AuthState {
        match self.user.read().await.as_ref() {
            None => AuthState::Unauthenticated,
            Some(user) if user.tokens.is_valid_at(self.clock.now()) => AuthState::Authenticated,
            Some(_) => AuthState::Expired,
        }
    }

    // ========================================================================
    // Sign-in
    // ========================================================================

    /// Start an authorization-code flow. The returned URL is opened by the
    /// host; the redirect is handed back through
    /// [`authenticate_with_code`](Self::authenticate_with_code).
    #[instrument(skip(self, extra_query))]
    pub async fn begin_authorization(
        &self,
        scopes: &[String],
        extra_query: &[(String, String)],
    ) -> Url {
        let pkce = PkceVerifier::new();
        let url = self.oauth.authorization_url(scopes, extra_query, &pkce);
        *self.pending.lock().await = Some(pkce);
        info!("Authorization flow started");
        url
    }

    /// Exchange an authorization code, then validate the identity through
    /// user-info.
    ///
    /// When `state` is given it must match the flow started by
    /// [`begin_authorization`](Self::begin_authorization).
    #[instrument(skip(self, code, state))]
    pub async fn authenticate_with_code(&self, code: &str, state: Option<&str>) -> Result<AuthUser> {
        let pkce = self.pending.lock().await.take();

        if let Some(state) = state {
            let matches = pkce.as_ref().is_some_and(|p| p.state() == state);
            if !matches {
                warn!("Authorization state mismatch");
                return Err(AuthError::StateMismatch);
            }
        }

        let request = self.oauth.code_request(code, pkce.as_ref())?;
        let tokens = self.exchange(request, None).await?;
        let info = self.get_user_info(&tokens).await?;

        let user = AuthUser {
            id: info.sub,
            name: info.name,
            email: info.email,
            tokens,
            authorize_url: self.oauth.authorize_url().to_string(),
        };

        *self.user.write().await = Some(user.clone());
        self.persist(&user).await;
        self.emit(AuthEvent::SignedIn {
            user_id: user.id.clone(),
            name: user.name.clone(),
        });

        info!(user_id = %user.id, "Signed in");
        Ok(user)
    }

    // ========================================================================
    // Refresh
    // ========================================================================

    /// Return the current session when its token is still valid, otherwise
    /// run a refresh-token exchange.
    ///
    /// Concurrent callers wait for a renewal already in flight and then see
    /// its tokens.
    #[instrument(skip(self))]
    pub async fn refresh_if_necessary(&self) -> Result<SessionRefresh> {
        let _renewing = self.renewing.lock().await;
        let user = self.current_user().await.ok_or(AuthError::NotSignedIn)?;

        if user.tokens.is_valid_at(self.clock.now()) {
            debug!("Access token still valid");
            return Ok(SessionRefresh::Existing(user));
        }

        self.refresh_tokens().await.map(SessionRefresh::Renewed)
    }

    /// Unconditional refresh-token exchange followed by user-info validation.
    #[instrument(skip(self))]
    pub async fn refresh_tokens(&self) -> Result<AuthUser> {
        let result = self.try_refresh().await;

        match &result {
            Ok(user) => {
                self.emit(AuthEvent::TokenRefreshed {
                    user_id: user.id.clone(),
                    expires_at: user.tokens.expires_at.timestamp(),
                });
                info!(user_id = %user.id, "Tokens refreshed");
            }
            Err(e) => {
                warn!(error = %e, "Token refresh failed");
                self.emit(AuthEvent::RefreshFailed {
                    message: e.to_string(),
                });
            }
        }

        result
    }

    async fn try_refresh(&self) -> Result<AuthUser> {
        let current = self.current_user().await.ok_or(AuthError::NotSignedIn)?;
        let refresh_token = current
            .tokens
            .refresh
            .clone()
            .filter(|r| !r.is_empty())
            .ok_or(AuthError::NotSignedIn)?;

        let request = self.oauth.refresh_request(&refresh_token)?;
        let tokens = self.exchange(request, Some(refresh_token)).await?;
        let info = self.get_user_info(&tokens).await?;

        let user = AuthUser {
            id: info.sub,
            name: info.name,
            email: info.email,
            tokens,
            authorize_url: current.authorize_url,
        };

        *self.user.write().await = Some(user.clone());
        self.persist(&user).await;
        Ok(user)
    }

    // ========================================================================
    // Authorized requests
    // ========================================================================

    /// Execute `request` with the current bearer token.
    ///
    /// Any response, 4xx and 5xx included, is returned as `Ok` unless the
    /// retry path applies. With `can_retry`, a status in
    /// [`RETRYABLE_STATUSES`] triggers one refresh and one replay.
    #[instrument(skip(self, request), fields(method = ?request.method, url = %request.url))]
    pub async fn authorized_request(
        &self,
        request: HttpRequest,
        can_retry: bool,
    ) -> Result<HttpResponse> {
        let tokens = self.tokens().await.ok_or(AuthError::NotSignedIn)?;
        let response = self
            .http
            .execute(authorize(request.clone(), &tokens.access))
            .await?;

        if !can_retry || !RETRYABLE_STATUSES.contains(&response.status) {
            return Ok(response);
        }

        debug!(status = response.status, "Retryable status, refreshing tokens");
        let user = self.refresh_tokens().await?;
        let response = self
            .http
            .execute(authorize(request, &user.tokens.access))
            .await?;
        Ok(response)
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Adopt a previously persisted session. The tokens may be expired; the
    /// next [`refresh_if_necessary`](Self::refresh_if_necessary) renews them.
    pub async fn restore(&self, session: PersistedSession) -> AuthUser {
        let user = session.user;
        *self.user.write().await = Some(user.clone());
        self.emit(AuthEvent::SignedIn {
            user_id: user.id.clone(),
            name: user.name.clone(),
        });
        info!(user_id = %user.id, "Session restored");
        user
    }

    /// Load and adopt the session from the configured store, if any.
    pub async fn restore_from_store(&self) -> Result<Option<AuthUser>> {
        let Some(store) = &self.store else {
            return Ok(None);
        };
        match store.load().await? {
            Some(session) => Ok(Some(self.restore(session).await)),
            None => Ok(None),
        }
    }

    pub async fn persisted(&self) -> Option<PersistedSession> {
        self.current_user().await.map(PersistedSession::new)
    }

    #[instrument(skip(self))]
    pub async fn sign_out(&self) -> Result<()> {
        let previous = self.user.write().await.take();
        self.pending.lock().await.take();

        self.emit(AuthEvent::SignedOut {
            user_id: previous.map(|u| u.id),
        });
        info!("Signed out");

        if let Some(store) = &self.store {
            store.clear().await?;
        }
        Ok(())
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Run a token request and build the new token set. `previous_refresh`
    /// is kept when the response carries no refresh token.
    async fn exchange(
        &self,
        request: HttpRequest,
        previous_refresh: Option<String>,
    ) -> Result<TokenSet> {
        let endpoint = request.url.clone();
        let response = self.http.execute(request).await?;
        let body: TokenResponse = response
            .json()
            .map_err(|e| AuthError::decode(&endpoint, e))?;

        let (Some(access), Some(expires_in)) = (body.access_token, body.expires_in) else {
            warn!(status = response.status, "Token response without token");
            return Err(AuthError::FailedToAuthenticate(NO_TOKEN_MESSAGE.to_string()));
        };
        if access.is_empty() {
            return Err(AuthError::FailedToAuthenticate(NO_TOKEN_MESSAGE.to_string()));
        }

        let padding = ChronoDuration::milliseconds(self.expiry_padding.as_millis() as i64);
        let expires_at = self.clock.now() + ChronoDuration::seconds(expires_in) - padding;
        let refresh = body.refresh_token.filter(|r| !r.is_empty()).or(previous_refresh);

        Ok(TokenSet::new(access, expires_at, refresh))
    }

    /// User-info call with the freshly issued tokens. Never retried.
    async fn get_user_info(&self, tokens: &TokenSet) -> Result<UserInfo> {
        let request = authorize(
            HttpRequest::new(HttpMethod::Get, self.userinfo_url.as_str()),
            &tokens.access,
        );
        let response = self.http.execute(request).await?;

        if !response.is_success() {
            return Err(AuthError::FailedToAuthenticate(format!(
                "User info request failed with status {}",
                response.status
            )));
        }

        response
            .json()
            .map_err(|e| AuthError::decode(self.userinfo_url.as_str(), e))
    }

    async fn persist(&self, user: &AuthUser) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save(&PersistedSession::new(user.clone())).await {
                warn!(error = %e, "Session not persisted");
            }
        }
    }

    fn emit(&self, event: AuthEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit(CoreEvent::Auth(event)).ok();
        }
    }
}

fn authorize(request: HttpRequest, access_token: &str) -> HttpRequest {
    request
        .bearer_token(access_token)
        .header("Accept", "application/json")
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("authorize_url", &self.oauth.authorize_url().as_str())
            .field("userinfo_url", &self.userinfo_url.as_str())
            .finish_non_exhaustive()
    }
}
