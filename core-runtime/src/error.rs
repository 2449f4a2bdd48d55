use std::fmt;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Capability missing: {capability} - {message}")]
    CapabilityMissing { capability: String, message: String },

    #[error("Invalid server URL '{url}': {message}")]
    InvalidServerUrl { url: String, message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

// ============================================================================
// User-facing errors
// ============================================================================

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Category of a failure shown to the end user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UserErrorKind {
    InvalidServerUrl,
    FailedToAuthenticate,
    FailedToUploadVideo,
    FailedToSaveVideo,
}

impl UserErrorKind {
    pub fn message(&self) -> &'static str {
        match self {
            UserErrorKind::InvalidServerUrl => "Invalid Layers Box URL",
            UserErrorKind::FailedToAuthenticate => "Failed to authenticate with Layers Box",
            UserErrorKind::FailedToUploadVideo => "Failed to upload video",
            UserErrorKind::FailedToSaveVideo => "Failed to save video",
        }
    }
}

/// A failure safe to present to the user.
///
/// The message never contains transport details. The optional inner error
/// is kept for logs and is exposed through [`std::error::Error::source`].
#[derive(Debug)]
pub struct UserError {
    kind: UserErrorKind,
    inner: Option<BoxError>,
}

impl UserError {
    pub fn new(kind: UserErrorKind) -> Self {
        Self { kind, inner: None }
    }

    pub fn with_inner<E>(kind: UserErrorKind, inner: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self {
            kind,
            inner: Some(inner.into()),
        }
    }

    pub fn invalid_server_url(inner: Option<BoxError>) -> Self {
        Self {
            kind: UserErrorKind::InvalidServerUrl,
            inner,
        }
    }

    pub fn failed_to_authenticate(inner: Option<BoxError>) -> Self {
        Self {
            kind: UserErrorKind::FailedToAuthenticate,
            inner,
        }
    }

    pub fn failed_to_upload_video(inner: Option<BoxError>) -> Self {
        Self {
            kind: UserErrorKind::FailedToUploadVideo,
            inner,
        }
    }

    pub fn failed_to_save_video(inner: Option<BoxError>) -> Self {
        Self {
            kind: UserErrorKind::FailedToSaveVideo,
            inner,
        }
    }

    /// Same category, different inner error.
    pub fn with_inner_error<E>(self, inner: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::with_inner(self.kind, inner)
    }

    /// Attach a plain diagnostic message as the inner error.
    pub fn with_debug_error(self, description: impl Into<String>) -> Self {
        self.with_inner_error(format!("[{}]", description.into()))
    }

    pub fn kind(&self) -> UserErrorKind {
        self.kind
    }

    pub fn message(&self) -> &'static str {
        self.kind.message()
    }

    pub fn inner(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        self.inner.as_deref()
    }
}

impl fmt::Display for UserError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind.message())?;
        if let Some(inner) = &self.inner {
            write!(f, "\n{}", inner)?;
        }
        Ok(())
    }
}

impl std::error::Error for UserError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

impl From<Error> for UserError {
    fn from(error: Error) -> Self {
        match error {
            Error::InvalidServerUrl { .. } => Self::invalid_server_url(Some(Box::new(error))),
            other => Self::failed_to_authenticate(Some(Box::new(other))),
        }
    }
}
