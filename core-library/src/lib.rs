//! # Video Library
//!
//! Domain entities and the local store behind the sync engine.
//!
//! ## Overview
//!
//! - [`models`]: `VideoRecord`, `VideoManifest`, `VideoRevisionSummary`,
//!   `Group`, `User` and the cached `GroupList`
//! - [`repositories`]: the `VideoStore` and `GroupCache` contracts with SQLite
//!   and in-memory implementations
//! - [`db`]: SQLite pool creation with embedded migrations

pub mod db;
pub mod error;
pub mod models;
pub mod repositories;

pub use error::{LibraryError, Result};
pub use models::{
    Author, Group, GroupList, User, VideoFilter, VideoId, VideoManifest, VideoRecord,
    VideoRevisionSummary,
};
pub use repositories::{
    GroupCache, MemoryGroupCache, MemoryVideoStore, SqliteGroupCache, SqliteVideoStore,
    VideoStore,
};
