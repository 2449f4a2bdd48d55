//! # Core Configuration Module
//!
//! Configuration for the video sync core.
//!
//! ## Overview
//!
//! A [`CoreConfig`] is assembled through [`CoreConfigBuilder`] and holds the
//! host capabilities (HTTP, secure storage, clock) together with the settings
//! the service layer needs: which server to talk to, the OAuth client, the
//! sync tuning knobs, and logging. Validation is fail-fast: a missing
//! required capability is reported with [`Error::CapabilityMissing`] when
//! `build()` is called, never later at first use.
//!
//! ## Required Dependencies
//!
//! - `HttpClient` - every remote call goes through it
//! - `OAuthConfig` - the registered client id for the identity provider
//!
//! ## Optional Dependencies
//!
//! - `SecureStore` - session persistence across restarts
//! - `Clock` - defaults to [`SystemClock`]
//!
//! When the `desktop-shims` feature is enabled, `ReqwestHttpClient` and
//! `KeyringSecureStore` are injected if not provided.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{CoreConfig, OAuthConfig, ServerTarget};
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .server(ServerTarget::private("https://layersbox.example.org")?)
//!     .oauth(OAuthConfig::new("video-sync-client", "videosync://oauth2/callback"))
//!     .http_client(Arc::new(MyHttpClient))
//!     .database_path("/data/videos.db")
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use crate::events::DEFAULT_EVENT_BUFFER_SIZE;
use crate::logging::LoggingConfig;
use bridge_traits::{Clock, HttpClient, SecureStore, SystemClock};
use core_async::tree::CompletionMode;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// API base of the public achrails deployment.
pub const DEFAULT_PUBLIC_API_URL: &str = "https://achrails.herokuapp.com/";

/// OpenID Connect provider backing the public deployment.
pub const DEFAULT_PUBLIC_OAUTH_URL: &str = "https://api.learning-layers.eu/o/oauth2/";

// ============================================================================
// Server targets
// ============================================================================

/// Resolved URLs for one server deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerEndpoints {
    /// Base for video and group API paths. Always ends with `/`.
    pub api_base: Url,
    pub authorize_url: Url,
    pub token_url: Url,
    pub userinfo_url: Url,
}

impl ServerEndpoints {
    /// Endpoints for an OAuth2 provider rooted at `oauth_base`.
    pub fn new(api_base: Url, oauth_base: &Url) -> Result<Self> {
        let join = |path: &str| {
            oauth_base.join(path).map_err(|e| Error::InvalidServerUrl {
                url: oauth_base.to_string(),
                message: e.to_string(),
            })
        };

        Ok(Self {
            api_base: ensure_trailing_slash(api_base),
            authorize_url: join("authorize")?,
            token_url: join("token")?,
            userinfo_url: join("userinfo")?,
        })
    }

    pub fn public() -> Result<Self> {
        let api_base = parse_server_url(DEFAULT_PUBLIC_API_URL)?;
        let oauth_base = parse_server_url(DEFAULT_PUBLIC_OAUTH_URL)?;
        Self::new(api_base, &oauth_base)
    }

    /// A private Layers Box serves the API under `achrails/` and the
    /// identity provider under `o/oauth2/`.
    pub fn for_layers_box(base: &Url) -> Result<Self> {
        let base = ensure_trailing_slash(base.clone());
        let invalid = |e: url::ParseError| Error::InvalidServerUrl {
            url: base.to_string(),
            message: e.to_string(),
        };

        let api_base = base.join("achrails/").map_err(invalid)?;
        let oauth_base = base.join("o/oauth2/").map_err(invalid)?;
        Self::new(api_base, &oauth_base)
    }
}

/// Which deployment the core talks to.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ServerTarget {
    #[default]
    Public,
    /// Private Layers Box at the given base URL.
    Private(Url),
}

impl ServerTarget {
    /// Parse a private Layers Box URL. Only absolute `http(s)` URLs with a
    /// host are accepted.
    pub fn private(base_url: &str) -> Result<Self> {
        parse_server_url(base_url).map(ServerTarget::Private)
    }

    pub fn is_public(&self) -> bool {
        matches!(self, ServerTarget::Public)
    }

    pub fn endpoints(&self) -> Result<ServerEndpoints> {
        match self {
            ServerTarget::Public => ServerEndpoints::public(),
            ServerTarget::Private(base) => ServerEndpoints::for_layers_box(base),
        }
    }
}

fn parse_server_url(raw: &str) -> Result<Url> {
    let invalid = |message: String| Error::InvalidServerUrl {
        url: raw.to_string(),
        message,
    };

    let url = Url::parse(raw.trim()).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(invalid("missing host".to_string()));
    }
    Ok(url)
}

fn ensure_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

// ============================================================================
// OAuth client
// ============================================================================

/// Registered OAuth2 client used by the auth session.
#[derive(Clone, PartialEq, Eq)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    /// Subtracted from the server-provided token lifetime.
    pub expiry_padding: Duration,
}

impl OAuthConfig {
    pub fn new(client_id: impl Into<String>, redirect_uri: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
            redirect_uri: redirect_uri.into(),
            scopes: ["openid", "profile", "email", "offline_access"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            expiry_padding: Duration::from_secs(5),
        }
    }

    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_expiry_padding(mut self, padding: Duration) -> Self {
        self.expiry_padding = padding;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(Error::Config("OAuth client id cannot be empty".to_string()));
        }
        if self.redirect_uri.trim().is_empty() {
            return Err(Error::Config(
                "OAuth redirect URI cannot be empty".to_string(),
            ));
        }
        if self.expiry_padding > Duration::from_secs(300) {
            return Err(Error::Config(
                "Token expiry padding exceeds maximum of 300 seconds".to_string(),
            ));
        }
        Ok(())
    }
}

impl std::fmt::Debug for OAuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "[REDACTED]"))
            .field("redirect_uri", &self.redirect_uri)
            .field("scopes", &self.scopes)
            .field("expiry_padding", &self.expiry_padding)
            .finish()
    }
}

// ============================================================================
// Sync tuning
// ============================================================================

/// Tuning for refresh cycles and the upload pipeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncConfig {
    /// When the umbrella refresh task reports completion.
    pub completion_mode: CompletionMode,
    /// Period of synthetic progress ticks while the final PUT is in flight.
    pub put_tick_interval: Duration,
    pub put_tick_step: f64,
    /// Synthetic progress never passes this value.
    pub put_tick_cap: f64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            completion_mode: CompletionMode::WaitForChildren,
            put_tick_interval: Duration::from_millis(500),
            put_tick_step: 0.05,
            put_tick_cap: 0.9,
        }
    }
}

impl SyncConfig {
    pub fn with_completion_mode(mut self, mode: CompletionMode) -> Self {
        self.completion_mode = mode;
        self
    }

    pub fn with_put_ticks(mut self, interval: Duration, step: f64, cap: f64) -> Self {
        self.put_tick_interval = interval;
        self.put_tick_step = step;
        self.put_tick_cap = cap;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.put_tick_interval.is_zero() {
            return Err(Error::Config(
                "PUT progress tick interval must be greater than 0".to_string(),
            ));
        }
        if !(self.put_tick_step > 0.0 && self.put_tick_step <= 0.2) {
            return Err(Error::Config(
                "PUT progress tick step must be in (0, 0.2]".to_string(),
            ));
        }
        // Ticks run inside the 80-100% band of the pipeline.
        if !(0.8..1.0).contains(&self.put_tick_cap) {
            return Err(Error::Config(
                "PUT progress tick cap must be in [0.8, 1.0)".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// CoreConfig
// ============================================================================

/// Everything needed to assemble the core service.
#[derive(Clone)]
pub struct CoreConfig {
    pub server: ServerTarget,
    /// Resolved from `server` at build time.
    pub endpoints: ServerEndpoints,
    pub oauth: OAuthConfig,
    pub sync: SyncConfig,
    /// `None` leaves logging to the host.
    pub logging: Option<LoggingConfig>,
    /// SQLite file for the video store. `None` keeps everything in memory.
    pub database_path: Option<PathBuf>,
    pub event_bus_capacity: usize,
    pub http_client: Arc<dyn HttpClient>,
    pub secure_store: Option<Arc<dyn SecureStore>>,
    pub clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("server", &self.server)
            .field("endpoints", &self.endpoints)
            .field("oauth", &self.oauth)
            .field("sync", &self.sync)
            .field("logging", &self.logging)
            .field("database_path", &self.database_path)
            .field("event_bus_capacity", &self.event_bus_capacity)
            .field("http_client", &"HttpClient { ... }")
            .field(
                "secure_store",
                &self.secure_store.as_ref().map(|_| "SecureStore { ... }"),
            )
            .finish()
    }
}

impl CoreConfig {
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Re-resolve endpoints after switching deployments (for example from a
    /// deep link).
    pub fn with_server(mut self, server: ServerTarget) -> Result<Self> {
        self.endpoints = server.endpoints()?;
        self.server = server;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        self.oauth.validate()?;
        self.sync.validate()?;

        if self.event_bus_capacity == 0 {
            return Err(Error::Config(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }
        if let Some(path) = &self.database_path {
            if path.as_os_str().is_empty() {
                return Err(Error::Config("Database path cannot be empty".to_string()));
            }
        }
        Ok(())
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    Err(Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: "HttpClient implementation is required for all server communication. \
                 Desktop: enable the 'desktop-shims' feature to use the default ReqwestHttpClient. \
                 Mobile: inject the platform networking stack."
            .to_string(),
    })
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    let client = bridge_desktop::ReqwestHttpClient::new().map_err(|e| Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: format!("Default ReqwestHttpClient could not be created: {}", e),
    })?;
    Ok(Arc::new(client))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_secure_store() -> Option<Arc<dyn SecureStore>> {
    None
}

#[cfg(feature = "desktop-shims")]
fn provide_default_secure_store() -> Option<Arc<dyn SecureStore>> {
    Some(Arc::new(bridge_desktop::KeyringSecureStore::new()))
}

/// Builder for [`CoreConfig`].
#[derive(Default)]
pub struct CoreConfigBuilder {
    server: ServerTarget,
    oauth: Option<OAuthConfig>,
    sync: SyncConfig,
    logging: Option<LoggingConfig>,
    database_path: Option<PathBuf>,
    event_bus_capacity: Option<usize>,
    http_client: Option<Arc<dyn HttpClient>>,
    secure_store: Option<Arc<dyn SecureStore>>,
    clock: Option<Arc<dyn Clock>>,
}

impl CoreConfigBuilder {
    pub fn server(mut self, server: ServerTarget) -> Self {
        self.server = server;
        self
    }

    pub fn oauth(mut self, oauth: OAuthConfig) -> Self {
        self.oauth = Some(oauth);
        self
    }

    pub fn sync(mut self, sync: SyncConfig) -> Self {
        self.sync = sync;
        self
    }

    pub fn completion_mode(mut self, mode: CompletionMode) -> Self {
        self.sync.completion_mode = mode;
        self
    }

    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = Some(logging);
        self
    }

    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    pub fn event_bus_capacity(mut self, capacity: usize) -> Self {
        self.event_bus_capacity = Some(capacity);
        self
    }

    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn secure_store(mut self, store: Arc<dyn SecureStore>) -> Self {
        self.secure_store = Some(store);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Build and validate the configuration.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the OAuth client is missing or a setting is out of range
    /// - [`Error::CapabilityMissing`] if no `HttpClient` is available
    /// - [`Error::InvalidServerUrl`] if the server endpoints cannot be derived
    pub fn build(self) -> Result<CoreConfig> {
        let oauth = self.oauth.ok_or_else(|| {
            Error::Config("OAuth client configuration is required. Use .oauth() to set it.".to_string())
        })?;

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client()?,
        };

        let endpoints = self.server.endpoints()?;

        let config = CoreConfig {
            server: self.server,
            endpoints,
            oauth,
            sync: self.sync,
            logging: self.logging,
            database_path: self.database_path,
            event_bus_capacity: self.event_bus_capacity.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
            http_client,
            secure_store: self.secure_store.or_else(provide_default_secure_store),
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
        };

        config.validate()?;
        Ok(config)
    }
}
