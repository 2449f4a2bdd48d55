//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the video sync core:
//! - Logging and tracing infrastructure
//! - Configuration management (server targets, OAuth client, sync tuning)
//! - Event bus system
//! - User-facing error taxonomy
//!
//! ## Overview
//!
//! This crate contains the runtime utilities that every other core crate
//! depends on. It establishes the logging conventions, the event
//! broadcasting mechanism, and the configuration object the service layer
//! is assembled from.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result, UserError, UserErrorKind};
