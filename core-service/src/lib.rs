//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (HTTP, secure
//! storage, clock) into the shared Rust core: it opens the local store,
//! restores the persisted session, builds the AchRails client for the signed
//! in account and hands everything to the [`SyncEngine`]. Desktop apps
//! typically enable the `desktop-shims` feature, which lets
//! [`CoreConfig`] fall back to the `bridge-desktop` adapters.
//!
//! ```ignore
//! use core_service::CoreService;
//!
//! let core = CoreService::bootstrap(config).await?;
//! let url = core.begin_sign_in().await;
//! // ... host opens `url`, receives the redirect ...
//! core.complete_sign_in(&code, Some(&state)).await?;
//! let report = core.engine().refresh_online().unwrap().wait().await;
//! ```

pub mod deep_link;
pub mod error;

pub use deep_link::{DeepLink, DeepLinkError, PendingAction, PUBLIC_HOST};
pub use error::{Result, ServiceError};

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use core_auth::{AuthSession, AuthUser, SessionStore};
use core_library::db::{create_pool, DatabaseConfig};
use core_library::{
    GroupCache, MemoryGroupCache, MemoryVideoStore, SqliteGroupCache, SqliteVideoStore, VideoStore,
};
use core_runtime::config::{CoreConfig, ServerEndpoints, ServerTarget};
use core_runtime::events::EventBus;
use core_runtime::logging::init_logging;
use core_sync::{SyncEngine, ThumbnailUploader, UploadPipeline, VideoUploader};
use provider_achrails::AchRailsClient;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Session and endpoints for the deployment currently in use.
#[derive(Clone)]
struct Connection {
    server: ServerTarget,
    endpoints: ServerEndpoints,
    session: Arc<AuthSession>,
}

impl Connection {
    fn open(config: &CoreConfig, server: ServerTarget, endpoints: ServerEndpoints, bus: &EventBus) -> Self {
        let mut session = AuthSession::new(
            Arc::clone(&config.http_client),
            &config.oauth,
            &endpoints,
            Arc::clone(&config.clock),
        )
        .with_event_bus(bus.clone());
        if let Some(store) = &config.secure_store {
            session = session.with_session_store(SessionStore::new(Arc::clone(store)));
        }

        Self {
            server,
            endpoints,
            session: Arc::new(session),
        }
    }

    fn client_for(&self, user_id: &str) -> AchRailsClient {
        AchRailsClient::new(
            Arc::clone(&self.session),
            self.endpoints.api_base.clone(),
            user_id,
        )
    }
}

struct ServiceInner {
    config: CoreConfig,
    event_bus: EventBus,
    engine: SyncEngine,
    connection: RwLock<Connection>,
    pending: Mutex<Option<PendingAction>>,
}

/// Builder for [`CoreService`], mainly to register upload providers.
pub struct CoreServiceBuilder {
    config: CoreConfig,
    video_uploaders: Vec<Arc<dyn VideoUploader>>,
    thumbnail_uploaders: Vec<Arc<dyn ThumbnailUploader>>,
}

impl CoreServiceBuilder {
    /// Providers are tried in registration order.
    pub fn video_uploader(mut self, uploader: Arc<dyn VideoUploader>) -> Self {
        self.video_uploaders.push(uploader);
        self
    }

    pub fn thumbnail_uploader(mut self, uploader: Arc<dyn ThumbnailUploader>) -> Self {
        self.thumbnail_uploaders.push(uploader);
        self
    }

    /// Assemble the object graph, restore the persisted session and load
    /// local state.
    #[instrument(skip(self), fields(server = ?self.config.server))]
    pub async fn build(self) -> Result<CoreService> {
        let config = self.config;

        if let Some(logging) = config.logging.clone() {
            // The host may already have installed a subscriber.
            if let Err(e) = init_logging(logging) {
                warn!(error = %e, "Logging not initialized by core");
            }
        }

        let event_bus = EventBus::new(config.event_bus_capacity);
        let (store, group_cache) = open_stores(config.database_path.as_deref()).await?;

        let mut uploads = UploadPipeline::new(config.sync).with_event_bus(event_bus.clone());
        for uploader in self.video_uploaders {
            uploads = uploads.with_video_uploader(uploader);
        }
        for uploader in self.thumbnail_uploaders {
            uploads = uploads.with_thumbnail_uploader(uploader);
        }

        let engine = SyncEngine::builder(store, group_cache)
            .config(config.sync)
            .upload_pipeline(uploads)
            .event_bus(event_bus.clone())
            .build();

        let connection = Connection::open(
            &config,
            config.server.clone(),
            config.endpoints.clone(),
            &event_bus,
        );

        let service = CoreService {
            inner: Arc::new(ServiceInner {
                config,
                event_bus,
                engine,
                connection: RwLock::new(connection),
                pending: Mutex::new(None),
            }),
        };

        service.restore_session().await;
        service.inner.engine.refresh().await?;

        info!("Core service ready");
        Ok(service)
    }
}

async fn open_stores(path: Option<&Path>) -> Result<(Arc<dyn VideoStore>, Arc<dyn GroupCache>)> {
    match path {
        Some(path) => {
            let pool = create_pool(DatabaseConfig::new(path)).await?;
            Ok((
                Arc::new(SqliteVideoStore::new(pool.clone())),
                Arc::new(SqliteGroupCache::new(pool)),
            ))
        }
        None => {
            debug!("No database path, keeping videos in memory");
            Ok((
                Arc::new(MemoryVideoStore::new()),
                Arc::new(MemoryGroupCache::new()),
            ))
        }
    }
}

/// Primary façade exposed to host applications.
///
/// Cloning yields another handle to the same service.
#[derive(Clone)]
pub struct CoreService {
    inner: Arc<ServiceInner>,
}

impl CoreService {
    pub fn builder(config: CoreConfig) -> CoreServiceBuilder {
        CoreServiceBuilder {
            config,
            video_uploaders: Vec::new(),
            thumbnail_uploaders: Vec::new(),
        }
    }

    /// Bootstrap without upload providers.
    pub async fn bootstrap(config: CoreConfig) -> Result<Self> {
        Self::builder(config).build().await
    }

    pub fn engine(&self) -> &SyncEngine {
        &self.inner.engine
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.inner.event_bus
    }

    pub fn config(&self) -> &CoreConfig {
        &self.inner.config
    }

    pub fn session(&self) -> Arc<AuthSession> {
        Arc::clone(&self.connection().session)
    }

    pub fn server(&self) -> ServerTarget {
        self.connection().server
    }

    pub fn endpoints(&self) -> ServerEndpoints {
        self.connection().endpoints
    }

    // ------------------------------------------------------------------
    // Account
    // ------------------------------------------------------------------

    /// Authorization URL for the host to open.
    pub async fn begin_sign_in(&self) -> Url {
        self.session()
            .begin_authorization(&self.inner.config.oauth.scopes, &[])
            .await
    }

    /// Finish sign-in with the code from the redirect and connect the
    /// engine to the account.
    #[instrument(skip(self, code, state))]
    pub async fn complete_sign_in(&self, code: &str, state: Option<&str>) -> Result<AuthUser> {
        let connection = self.connection();
        let user = connection.session.authenticate_with_code(code, state).await?;

        self.inner
            .engine
            .set_remote(Some(Arc::new(connection.client_for(&user.id))));
        self.inner.engine.refresh().await?;

        info!(user_id = %user.id, "Account connected");
        Ok(user)
    }

    /// Disconnect the engine, forget the session and reload local state so
    /// only never-published videos remain visible.
    #[instrument(skip(self))]
    pub async fn sign_out(&self) -> Result<()> {
        self.inner.engine.set_remote(None);
        let signed_out = self.session().sign_out().await;
        self.inner.engine.refresh().await?;
        signed_out?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Deep links
    // ------------------------------------------------------------------

    /// Handle an incoming link: switch deployments when it names another
    /// server and remember its action for [`take_pending_action`](Self::take_pending_action).
    ///
    /// A rejected link changes nothing.
    #[instrument(skip(self))]
    pub async fn open_deep_link(&self, raw: &str) -> Result<DeepLink> {
        let link = DeepLink::parse(raw)?;

        if link.server != self.server() {
            self.switch_server(link.server.clone()).await?;
        }
        *self.lock_pending() = link.action;

        debug!(action = ?link.action, "Deep link opened");
        Ok(link)
    }

    pub fn pending_action(&self) -> Option<PendingAction> {
        *self.lock_pending()
    }

    pub fn take_pending_action(&self) -> Option<PendingAction> {
        self.lock_pending().take()
    }

    /// Point the core at another deployment. The current account belongs to
    /// the old server, so it is signed out first.
    #[instrument(skip(self))]
    pub async fn switch_server(&self, server: ServerTarget) -> Result<()> {
        let endpoints = server.endpoints()?;

        self.inner.engine.set_remote(None);
        if let Err(e) = self.session().sign_out().await {
            warn!(error = %e, "Failed to clear session of previous server");
        }

        let connection = Connection::open(&self.inner.config, server, endpoints, &self.inner.event_bus);
        info!(api_base = %connection.endpoints.api_base, "Server switched");
        *self
            .inner
            .connection
            .write()
            .unwrap_or_else(PoisonError::into_inner) = connection;

        self.inner.engine.refresh().await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn connection(&self) -> Connection {
        self.inner
            .connection
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, Option<PendingAction>> {
        self.inner.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adopt the stored session when it was created against the current
    /// server. Failures leave the service signed out.
    async fn restore_session(&self) {
        let Some(secure_store) = &self.inner.config.secure_store else {
            return;
        };
        let connection = self.connection();

        let stored = match SessionStore::new(Arc::clone(secure_store)).load().await {
            Ok(Some(stored)) => stored,
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, "Failed to load persisted session");
                return;
            }
        };

        if stored.user.authorize_url != connection.endpoints.authorize_url.as_str() {
            info!(
                stored = %stored.user.authorize_url,
                "Persisted session belongs to another server, ignoring"
            );
            return;
        }

        let user = connection.session.restore(stored).await;
        self.inner
            .engine
            .set_remote(Some(Arc::new(connection.client_for(&user.id))));
    }
}

impl std::fmt::Debug for CoreService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreService")
            .field("server", &self.server())
            .field("engine", &self.inner.engine)
            .finish()
    }
}
