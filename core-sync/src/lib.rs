//! # Sync Module
//!
//! Reconciles the local video store with the AchRails server.
//!
//! ## Components
//!
//! - **Sync Engine** (`engine`): online refresh cycles as task trees, local
//!   edits and deletes, remote passthroughs, the in-memory view and its listeners
//! - **Upload Pipeline** (`upload`): media publishing with provider fallback
//!   and blended progress
//! - **Collections** (`collections`): all-videos, per-group and tag views
//! - **Report** (`report`): per-item outcome log of a refresh cycle

pub mod collections;
pub mod engine;
pub mod error;
pub mod listeners;
pub mod report;
pub mod upload;

pub use collections::{Collection, CollectionId, CollectionKind, Collections};
pub use engine::{RefreshHandle, SyncEngine, SyncEngineBuilder};
pub use error::{Result, SyncError};
pub use listeners::{ListenerId, RepositoryListener};
pub use report::{ItemOutcome, StepOutcome, SyncAction, SyncReport};
pub use upload::{
    ProgressCallback, ProgressReporter, ThumbnailUploader, UploadPipeline, UploadProgress,
    UploadedMedia, VideoUploader,
};
