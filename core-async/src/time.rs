//! Time-related helpers.
//!
//! # Examples
//!
//! ```rust,no_run
//! use core_async::time::{sleep, timeout, Duration};
//!
//! # async fn example() {
//! sleep(Duration::from_millis(10)).await;
//! let result = timeout(Duration::from_secs(1), async { 42 }).await;
//! assert_eq!(result.unwrap(), 42);
//! # }
//! ```

pub use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
pub use tokio::time::{interval, sleep, sleep_until, timeout, Interval, MissedTickBehavior};

/// Error returned when [`timeout`] elapses.
pub type Elapsed = tokio::time::error::Elapsed;
