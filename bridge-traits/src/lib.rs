//! # Host Bridge Traits
//!
//! Capability contracts the core requires from its host.
//!
//! ## Overview
//!
//! The sync core never talks to the network, the OS keychain or the wall
//! clock directly. Each of those is a trait defined here and implemented per
//! platform (`bridge-desktop` ships the desktop adapters). Tests substitute
//! in-process fakes for the same traits.
//!
//! ## Traits
//!
//! - [`HttpClient`](http::HttpClient) - Executes a single HTTP request
//! - [`SecureStore`](storage::SecureStore) - Credential persistence (Keychain/Keystore)
//! - [`Clock`](time::Clock) - Time source for deterministic token expiry tests
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! The `testing` feature adds in-process fakes (`ScriptedHttpClient`,
//! `MemorySecureStore`) for test suites.
//!
//! ## Fail-Fast Strategy
//!
//! The core fails fast with a descriptive error when a required capability is
//! missing:
//!
//! ```ignore
//! let http_client = config.http_client
//!     .ok_or_else(|| Error::CapabilityMissing {
//!         capability: "HttpClient".to_string(),
//!         message: "No HTTP client implementation provided".to_string(),
//!     })?;
//! ```
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so implementations can be shared
//! across async tasks behind an `Arc`.

pub mod error;
pub mod http;
pub mod storage;
pub mod time;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::BridgeError;

pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
pub use storage::SecureStore;
pub use time::{Clock, LogEntry, LogLevel, LoggerSink, ManualClock, SystemClock};
