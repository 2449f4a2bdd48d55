use core_library::{LibraryError, VideoId};
use provider_achrails::RemoteError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Local store error: {0}")]
    Persistence(#[from] LibraryError),

    /// An upload was scheduled for a record the local store no longer has.
    #[error("Video {0} not found locally")]
    ConflictPolicy(VideoId),

    #[error("No remote client configured")]
    NotConfigured,

    #[error("Task error: {0}")]
    Task(String),
}

impl SyncError {
    pub(crate) fn coordinator_stopped() -> Self {
        SyncError::Task("coordinator stopped".to_string())
    }

    /// Network or server failure, as opposed to a local one.
    pub fn is_remote(&self) -> bool {
        matches!(self, SyncError::Remote(_))
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
