//! Async abstraction layer for the video sync core.
//!
//! All core-* and provider-* crates go through this crate instead of
//! depending on tokio directly, so the runtime surface stays in one place.
//!
//! # Modules
//!
//! - `task`: Task spawning and join handles
//! - `runtime`: Runtime handles and `block_on` for synchronous callers
//! - `time`: Sleep, timeout and interval helpers
//! - `sync`: Async-aware locks, channels and cancellation
//! - `tree`: Hierarchical [`Task`] units with parent/child bookkeeping
//! - `coordinator`: A single sequential execution context for shared state
//!
//! # Examples
//!
//! ```rust,no_run
//! use core_async::tree::Task;
//!
//! # async fn example() {
//! let task = Task::new("fetch", |task| async move {
//!     // ... network work ...
//!     task.done();
//! });
//! task.start();
//! let outcome = task.wait().await;
//! assert!(outcome.is_ok());
//! # }
//! ```

pub mod coordinator;
pub mod runtime;
pub mod sync;
pub mod task;
pub mod time;
pub mod tree;

pub use coordinator::Coordinator;
pub use task::spawn;
pub use time::{sleep, Duration, Instant};
pub use tree::{CompletionMode, Task, TaskError, TaskOutcome, TaskState};
