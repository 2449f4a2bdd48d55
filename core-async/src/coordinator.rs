//! Single sequential execution context.
//!
//! A [`Coordinator`] owns one background loop that runs submitted jobs one at
//! a time, in submission order. State that must never be touched from two
//! places at once (in-memory collections, listener lists) is only mutated from
//! jobs running here, so listener callbacks are never invoked concurrently.
//!
//! ```rust,no_run
//! use core_async::Coordinator;
//!
//! # async fn example() {
//! let coordinator = Coordinator::spawn("ui");
//! coordinator.dispatch(async {
//!     // mutate shared state, notify listeners
//! });
//! coordinator.flush().await;
//! # }
//! ```

use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{debug, error};

use crate::sync::{mpsc, oneshot};

pub(crate) type Job = BoxFuture<'static, ()>;

/// Handle to a sequential executor. Cloning shares the same context.
#[derive(Clone, Debug)]
pub struct Coordinator {
    name: String,
    tx: mpsc::UnboundedSender<Job>,
}

impl Coordinator {
    /// Start the coordination loop on the current runtime.
    pub fn spawn(name: impl Into<String>) -> Self {
        let name = name.into();
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();

        let loop_name = name.clone();
        crate::task::spawn(async move {
            while let Some(job) = rx.recv().await {
                // A panicking job must not take the whole context down.
                if AssertUnwindSafe(job).catch_unwind().await.is_err() {
                    error!(coordinator = %loop_name, "Coordinator job panicked");
                }
            }
            debug!(coordinator = %loop_name, "Coordinator stopped");
        });

        Self { name, tx }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Enqueue a job. Returns `false` if the loop is no longer running.
    pub fn dispatch<F>(&self, job: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.try_dispatch(Box::pin(job)).is_ok()
    }

    pub(crate) fn try_dispatch(&self, job: Job) -> Result<(), Job> {
        self.tx.send(job).map_err(|rejected| rejected.0)
    }

    /// Run `job` on the coordinator and wait for its result.
    ///
    /// Returns `None` if the loop stopped before the job ran.
    pub async fn run<F, T>(&self, job: F) -> Option<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let accepted = self.dispatch(async move {
            let _ = tx.send(job.await);
        });
        if !accepted {
            return None;
        }
        rx.await.ok()
    }

    /// Wait until every job enqueued before this call has finished.
    pub async fn flush(&self) {
        self.run(async {}).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::Mutex;
    use crate::time::{sleep, Duration};
    use std::sync::Arc;

    #[tokio::test]
    async fn jobs_run_in_submission_order() {
        let coordinator = Coordinator::spawn("test");
        let log = Arc::new(Mutex::new(Vec::new()));

        for i in 0..5u64 {
            let log = Arc::clone(&log);
            coordinator.dispatch(async move {
                // Later jobs sleep less; ordering must still hold.
                sleep(Duration::from_millis(5 * (5 - i))).await;
                log.lock().await.push(i);
            });
        }

        coordinator.flush().await;
        assert_eq!(*log.lock().await, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn run_returns_job_output() {
        let coordinator = Coordinator::spawn("test");
        assert_eq!(coordinator.run(async { 7 * 6 }).await, Some(42));
    }

    #[tokio::test]
    async fn panicking_job_does_not_stop_loop() {
        let coordinator = Coordinator::spawn("test");
        coordinator.dispatch(async { panic!("boom") });
        assert_eq!(coordinator.run(async { "still alive" }).await, Some("still alive"));
    }
}
