//! Workspace umbrella crate.
//!
//! Host applications can depend on `video-sync-workspace` and enable the
//! `desktop-shims` feature to get the fully wired core (`core-service` with the
//! desktop bridge adapters) without depending on each crate individually.

#[cfg(feature = "desktop-shims")]
pub use core_service::*;
