//! # Local Store Contracts
//!
//! The sync engine sees the local database only through these traits.
//!
//! - [`VideoStore`] - find/save/delete/list for [`VideoRecord`]s
//! - [`GroupCache`] - the last fetched group listing
//!
//! Each has a SQLite implementation over a sqlx pool and an in-memory one.

use crate::error::Result;
use crate::models::{GroupList, VideoFilter, VideoId, VideoRecord};
use async_trait::async_trait;

pub mod group;
pub mod memory;
pub mod video;

pub use group::SqliteGroupCache;
pub use memory::{MemoryGroupCache, MemoryVideoStore};
pub use video::SqliteVideoStore;

#[async_trait]
pub trait VideoStore: Send + Sync {
    async fn find_by_id(&self, id: VideoId) -> Result<Option<VideoRecord>>;

    /// Insert or replace the record with the same id.
    async fn save(&self, record: &VideoRecord) -> Result<()>;

    /// `Ok(false)` when no record had that id.
    async fn delete(&self, id: VideoId) -> Result<bool>;

    /// Matching records, newest creation time first.
    async fn list_all(&self, filter: &VideoFilter) -> Result<Vec<VideoRecord>>;

    /// Make every save so far durable.
    async fn flush(&self) -> Result<()>;
}

#[async_trait]
pub trait GroupCache: Send + Sync {
    /// Replace the cached listing.
    async fn save_groups(&self, list: &GroupList) -> Result<()>;

    async fn load_groups(&self) -> Result<Option<GroupList>>;
}
