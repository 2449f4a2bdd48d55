//! # AchRails Provider
//!
//! Client for the AchRails video server API.
//!
//! ## Overview
//!
//! AchRails stores video manifests, revisions, groups and sharing. Every call
//! goes through [`core_auth::AuthSession`], so tokens are attached and
//! refreshed transparently.
//!
//! - Revision listing and full or conditional (`newer_than_rev`) fetches
//! - Manifest upload, deletion, publicity and group sharing
//! - Keyword search and the user's groups
//!
//! Transport, status and decode failures are reported as distinct
//! [`RemoteError`] variants.

pub mod client;
pub mod error;
pub mod types;

pub use client::{AchRailsClient, RemoteVideoApi};
pub use error::{RemoteError, Result};
pub use types::{FetchResult, RemoteGroups};
