//! Runtime handles and blocking entry points.
//!
//! Synchronous code that needs to drive a future (for example the logging
//! layer when no runtime is active on the current thread) goes through
//! [`block_on`] instead of building its own executor.

pub use tokio::runtime::{Builder, Handle, Runtime};

/// Drive `future` to completion on the current thread.
///
/// Must not be called from inside an async context; use
/// [`Handle::try_current`] to detect one first.
pub fn block_on<F>(future: F) -> F::Output
where
    F: std::future::Future,
{
    futures::executor::block_on(future)
}
