//! Synchronization primitives.
//!
//! Async-aware locks and channels from `tokio::sync`. These never block the
//! executor and are `Send + Sync`.
//!
//! # Examples
//!
//! ```rust,no_run
//! use core_async::sync::{Mutex, RwLock};
//!
//! # async fn example() {
//! let mutex = Mutex::new(42);
//! *mutex.lock().await += 1;
//!
//! let rwlock = RwLock::new(vec![1, 2, 3]);
//! assert_eq!(rwlock.read().await.len(), 3);
//! # }
//! ```

pub use tokio::sync::{
    broadcast, mpsc, oneshot, watch, Mutex, MutexGuard, Notify, RwLock, RwLockReadGuard,
    RwLockWriteGuard, Semaphore, SemaphorePermit,
};
