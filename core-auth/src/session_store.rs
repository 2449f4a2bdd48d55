//! Secure Session Storage
//!
//! Persists the signed-in session (identity plus token set) through the
//! host's [`SecureStore`] so a restart does not force a new sign-in.
//!
//! Token values are never logged. A stored blob that cannot be decoded is
//! treated as absent rather than as an error: the user simply signs in again.

use crate::error::{AuthError, Result};
use crate::types::{PersistedSession, PERSISTED_SESSION_VERSION};
use bridge_traits::storage::SecureStore;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Secure-store key used when none is given.
pub const DEFAULT_SESSION_KEY: &str = "videosync.auth.session";

#[derive(Clone)]
pub struct SessionStore {
    secure_store: Arc<dyn SecureStore>,
    key: String,
}

impl SessionStore {
    pub fn new(secure_store: Arc<dyn SecureStore>) -> Self {
        Self::with_key(secure_store, DEFAULT_SESSION_KEY)
    }

    pub fn with_key(secure_store: Arc<dyn SecureStore>, key: impl Into<String>) -> Self {
        Self {
            secure_store,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub async fn save(&self, session: &PersistedSession) -> Result<()> {
        let json = serde_json::to_vec(session)?;
        self.secure_store
            .set_secret(&self.key, &json)
            .await
            .map_err(|e| {
                warn!(key = %self.key, "Failed to persist session");
                AuthError::Storage(e.to_string())
            })?;

        info!(user_id = %session.user.id, "Session persisted");
        Ok(())
    }

    /// `Ok(None)` when nothing is stored, or when the stored blob is unreadable
    /// or from an unknown version.
    pub async fn load(&self) -> Result<Option<PersistedSession>> {
        let bytes = self
            .secure_store
            .get_secret(&self.key)
            .await
            .map_err(|e| AuthError::Storage(e.to_string()))?;

        let Some(bytes) = bytes else {
            debug!(key = %self.key, "No persisted session");
            return Ok(None);
        };

        match serde_json::from_slice::<PersistedSession>(&bytes) {
            Ok(session) if session.version == PERSISTED_SESSION_VERSION => Ok(Some(session)),
            Ok(session) => {
                warn!(version = session.version, "Ignoring persisted session with unknown version");
                Ok(None)
            }
            Err(e) => {
                warn!(error = %e, "Ignoring malformed persisted session");
                Ok(None)
            }
        }
    }

    pub async fn clear(&self) -> Result<()> {
        self.secure_store
            .delete_secret(&self.key)
            .await
            .map_err(|e| AuthError::Storage(e.to_string()))?;
        debug!(key = %self.key, "Persisted session cleared");
        Ok(())
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore").field("key", &self.key).finish()
    }
}
