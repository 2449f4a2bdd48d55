//! # Authentication Module
//!
//! OAuth 2.0 session for the Layers Box identity provider.
//!
//! ## Overview
//!
//! [`AuthSession`] holds the signed-in identity and its token set, refreshes
//! tokens on demand and executes authenticated requests for the remote API
//! client. Requests that fail with an auth-like status are replayed once
//! after a refresh.
//!
//! ## Features
//!
//! - Authorization-code flow with PKCE and CSRF `state`
//! - Refresh-token exchange with user-info re-validation
//! - Single refresh-then-retry for authorized requests
//! - Session persistence through the host's `SecureStore`
//! - Auth event emission on the core event bus

pub mod error;
pub mod oauth;
pub mod session;
pub mod session_store;
pub mod types;

pub use error::{AuthError, Result};
pub use oauth::{OAuthClient, PkceVerifier, TokenResponse};
pub use session::{AuthSession, RETRYABLE_STATUSES};
pub use session_store::{SessionStore, DEFAULT_SESSION_KEY};
pub use types::{AuthState, AuthUser, PersistedSession, SessionRefresh, TokenSet};
