use bridge_traits::BridgeError;
use core_runtime::UserError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Not signed in")]
    NotSignedIn,

    #[error("Failed to authenticate: {0}")]
    FailedToAuthenticate(String),

    #[error("Invalid server URL: {0}")]
    InvalidServerUrl(String),

    #[error("Authorization state mismatch")]
    StateMismatch,

    #[error("Transport error: {0}")]
    Transport(#[from] BridgeError),

    #[error("Malformed response from {endpoint}: {message}")]
    Decode { endpoint: String, message: String },

    #[error("Secure storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AuthError {
    pub(crate) fn decode(endpoint: impl Into<String>, message: impl ToString) -> Self {
        AuthError::Decode {
            endpoint: endpoint.into(),
            message: message.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;

impl From<AuthError> for UserError {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::InvalidServerUrl(_) => UserError::invalid_server_url(Some(Box::new(error))),
            other => UserError::failed_to_authenticate(Some(Box::new(other))),
        }
    }
}
