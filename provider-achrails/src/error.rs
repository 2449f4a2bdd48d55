//! Error types for the AchRails client

use core_auth::AuthError;
use thiserror::Error;

/// AchRails client errors
///
/// A response that arrived but could not be decoded is always `Decode`,
/// never `Transport`, so callers can tell an unreachable server from a
/// misbehaving one.
#[derive(Error, Debug)]
pub enum RemoteError {
    /// No response at all (connection, TLS, timeout).
    #[error("Network error: {0}")]
    Transport(String),

    #[error("Malformed response from {endpoint}: {message}")]
    Decode { endpoint: String, message: String },

    #[error("AchRails API error (status {status}) from {endpoint}")]
    Status { endpoint: String, status: u16 },

    /// Not signed in, or the token refresh on retry failed.
    #[error("Authentication failed: {0}")]
    Auth(AuthError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl RemoteError {
    pub(crate) fn decode(endpoint: impl Into<String>, message: impl ToString) -> Self {
        RemoteError::Decode {
            endpoint: endpoint.into(),
            message: message.to_string(),
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, RemoteError::Transport(_))
    }

    pub fn is_decode(&self) -> bool {
        matches!(self, RemoteError::Decode { .. })
    }
}

impl From<AuthError> for RemoteError {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::Transport(e) => RemoteError::Transport(e.to_string()),
            AuthError::Decode { endpoint, message } => RemoteError::Decode { endpoint, message },
            other => RemoteError::Auth(other),
        }
    }
}

/// Result type for AchRails operations
pub type Result<T> = std::result::Result<T, RemoteError>;
