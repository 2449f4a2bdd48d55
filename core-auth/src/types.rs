use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// OAuth 2.0 token set.
///
/// A token set is valid iff the access token is non-empty and its expiry is
/// strictly in the future. The expiry already has the safety margin
/// subtracted when the set is created from a token response.
///
/// # Security
///
/// The `Debug` implementation redacts both tokens.
///
/// ```
/// use core_auth::TokenSet;
/// use chrono::{Duration, Utc};
///
/// let now = Utc::now();
/// let tokens = TokenSet::new("access", now + Duration::hours(1), Some("refresh".into()));
/// assert!(tokens.is_valid_at(now));
/// assert!(!tokens.is_valid_at(now + Duration::hours(2)));
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    pub access: String,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub refresh: Option<String>,
}

impl TokenSet {
    pub fn new(access: impl Into<String>, expires_at: DateTime<Utc>, refresh: Option<String>) -> Self {
        Self {
            access: access.into(),
            expires_at,
            refresh,
        }
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.access.is_empty() && self.expires_at > now
    }

    pub fn has_refresh_token(&self) -> bool {
        self.refresh.as_deref().is_some_and(|r| !r.is_empty())
    }
}

impl fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSet")
            .field("access", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("refresh", &self.refresh.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// The signed-in identity, as confirmed by the user-info endpoint.
///
/// Two identities are the same user iff their `id` (OIDC subject) matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    pub name: String,
    pub email: String,
    pub tokens: TokenSet,
    /// Authorization endpoint the session was created against.
    pub authorize_url: String,
}

impl AuthUser {
    pub fn is_same_user(&self, other_id: &str) -> bool {
        self.id == other_id
    }
}

/// Coarse session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthState {
    #[default]
    Unauthenticated,
    /// Signed in with a currently valid access token.
    Authenticated,
    /// Signed in, but the access token must be refreshed before use.
    Expired,
}

impl AuthState {
    pub fn is_signed_in(&self) -> bool {
        !matches!(self, AuthState::Unauthenticated)
    }
}

/// Result of [`AuthSession::refresh_if_necessary`](crate::AuthSession::refresh_if_necessary).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionRefresh {
    /// Tokens were still valid, no network call was made.
    Existing(AuthUser),
    /// A refresh-token exchange produced a new token set.
    Renewed(AuthUser),
}

impl SessionRefresh {
    pub fn user(&self) -> &AuthUser {
        match self {
            SessionRefresh::Existing(user) | SessionRefresh::Renewed(user) => user,
        }
    }

    pub fn into_user(self) -> AuthUser {
        match self {
            SessionRefresh::Existing(user) | SessionRefresh::Renewed(user) => user,
        }
    }

    pub fn is_renewed(&self) -> bool {
        matches!(self, SessionRefresh::Renewed(_))
    }
}

pub const PERSISTED_SESSION_VERSION: u32 = 1;

/// What survives a process restart: identity, token set and the
/// authorization endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSession {
    pub version: u32,
    pub user: AuthUser,
}

impl PersistedSession {
    pub fn new(user: AuthUser) -> Self {
        Self {
            version: PERSISTED_SESSION_VERSION,
            user,
        }
    }
}

/// `{sub, name, email}` from the user-info endpoint.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct UserInfo {
    pub sub: String,
    pub name: String,
    pub email: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn user() -> AuthUser {
        AuthUser {
            id: "sub-1".to_string(),
            name: "Test User".to_string(),
            email: "test@example.com".to_string(),
            tokens: TokenSet::new("a1", Utc::now() + Duration::hours(1), Some("r1".to_string())),
            authorize_url: "https://idp/authorize".to_string(),
        }
    }

    #[test]
    fn test_token_validity() {
        let now = Utc::now();
        assert!(TokenSet::new("a", now + Duration::seconds(1), None).is_valid_at(now));
        assert!(!TokenSet::new("a", now, None).is_valid_at(now));
        assert!(!TokenSet::new("", now + Duration::hours(1), None).is_valid_at(now));
    }

    #[test]
    fn test_token_debug_redacts() {
        let tokens = TokenSet::new("secret-access", Utc::now(), Some("secret-refresh".to_string()));
        let debug = format!("{:?}", tokens);
        assert!(!debug.contains("secret-access"));
        assert!(!debug.contains("secret-refresh"));
        assert!(debug.contains("[REDACTED]"));

        let debug = format!("{:?}", user());
        assert!(!debug.contains("a1"));
    }

    #[test]
    fn test_refresh_token_presence() {
        let now = Utc::now();
        assert!(TokenSet::new("a", now, Some("r".into())).has_refresh_token());
        assert!(!TokenSet::new("a", now, Some(String::new())).has_refresh_token());
        assert!(!TokenSet::new("a", now, None).has_refresh_token());
    }

    #[test]
    fn test_persisted_session_roundtrip_shape() {
        let session = PersistedSession::new(user());
        let json = serde_json::to_value(&session).unwrap();
        assert_eq!(json["version"], 1);
        assert_eq!(json["user"]["id"], "sub-1");
        assert_eq!(json["user"]["authorize_url"], "https://idp/authorize");
        assert_eq!(json["user"]["tokens"]["refresh"], "r1");
    }

    #[test]
    fn test_session_refresh_accessors() {
        let renewed = SessionRefresh::Renewed(user());
        assert!(renewed.is_renewed());
        assert_eq!(renewed.user().id, "sub-1");
        assert!(!SessionRefresh::Existing(user()).is_renewed());
        assert!(AuthState::Expired.is_signed_in());
        assert!(!AuthState::default().is_signed_in());
    }
}
