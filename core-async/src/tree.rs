//! Hierarchical units of asynchronous work.
//!
//! A [`Task`] wraps a work function that runs at most once and reports its own
//! terminal state by calling [`Task::done`] or [`Task::fail`]. Tasks can
//! register children with [`Task::add_subtask`] for progress and bookkeeping.
//!
//! ## State machine
//!
//! ```text
//! Pending --start()--> Running --done()--> Succeeded
//!                              \--fail()--> Failed
//! ```
//!
//! Having children never completes a parent on its own. What children do
//! affect is *when* an explicit `done()`/`fail()` takes effect:
//!
//! - [`CompletionMode::EagerComplete`]: the parent turns terminal the moment
//!   its own logic calls `done()`/`fail()`, even if children are still running.
//! - [`CompletionMode::WaitForChildren`]: the request is recorded and the
//!   parent turns terminal once every registered child is terminal.
//!
//! A child's failure never fails or cancels its parent or siblings.
//!
//! The completion handler fires exactly once. If the task was built with a
//! [`Coordinator`], the handler runs on that context; otherwise it runs on a
//! freshly spawned task.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use futures::future::BoxFuture;
use tokio::sync::watch;
use tracing::{debug, trace, warn};

use crate::coordinator::Coordinator;

// ============================================================================
// Types
// ============================================================================

/// Lifecycle state of a [`Task`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Succeeded | TaskState::Failed)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Pending => "pending",
            TaskState::Running => "running",
            TaskState::Succeeded => "succeeded",
            TaskState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// How an explicit `done()`/`fail()` interacts with unfinished children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompletionMode {
    /// Terminal immediately when the task's own logic completes it.
    #[default]
    EagerComplete,
    /// Terminal only once the task completed itself and all children are terminal.
    WaitForChildren,
}

/// Cloneable, type-erased error carried by a failed task.
#[derive(Clone)]
pub struct TaskError(Arc<dyn std::error::Error + Send + Sync + 'static>);

impl TaskError {
    pub fn new<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self(Arc::new(error))
    }

    pub fn msg(message: impl Into<String>) -> Self {
        Self(Arc::new(Message(message.into())))
    }

    /// Borrow the wrapped error if it is of type `E`.
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: std::error::Error + 'static,
    {
        self.0.downcast_ref::<E>()
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::Debug for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl std::error::Error for TaskError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

#[derive(Debug)]
struct Message(String);

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for Message {}

/// Terminal result of a task.
pub type TaskOutcome = Result<(), TaskError>;

type Work = Box<dyn FnOnce(Task) -> BoxFuture<'static, ()> + Send>;
type Handler = Box<dyn FnOnce(TaskOutcome) -> BoxFuture<'static, ()> + Send>;

// ============================================================================
// Task
// ============================================================================

/// Handle to a unit of asynchronous work. Clones refer to the same task.
#[derive(Clone)]
pub struct Task {
    inner: Arc<Inner>,
}

struct Inner {
    name: String,
    mode: CompletionMode,
    coordinator: Option<Coordinator>,
    core: Mutex<Core>,
    terminal: watch::Sender<Option<TaskOutcome>>,
}

struct Core {
    state: TaskState,
    work: Option<Work>,
    handler: Option<Handler>,
    parent: Weak<Inner>,
    children: Vec<Task>,
    open_children: usize,
    requested: Option<TaskOutcome>,
    outcome: Option<TaskOutcome>,
}

/// Everything captured under the lock when a task turns terminal.
struct Sealed {
    outcome: TaskOutcome,
    handler: Option<Handler>,
    parent: Option<Arc<Inner>>,
}

/// Builder for tasks that need a non-default mode or a coordinator.
pub struct TaskBuilder {
    name: String,
    mode: CompletionMode,
    coordinator: Option<Coordinator>,
}

impl TaskBuilder {
    pub fn mode(mut self, mode: CompletionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Run the completion handler on `coordinator`.
    pub fn coordinator(mut self, coordinator: Coordinator) -> Self {
        self.coordinator = Some(coordinator);
        self
    }

    pub fn build<F, Fut>(self, work: F) -> Task
    where
        F: FnOnce(Task) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let work: Work = Box::new(move |task| Box::pin(work(task)));
        let (terminal, _) = watch::channel(None);

        Task {
            inner: Arc::new(Inner {
                name: self.name,
                mode: self.mode,
                coordinator: self.coordinator,
                core: Mutex::new(Core {
                    state: TaskState::Pending,
                    work: Some(work),
                    handler: None,
                    parent: Weak::new(),
                    children: Vec::new(),
                    open_children: 0,
                    requested: None,
                    outcome: None,
                }),
                terminal,
            }),
        }
    }
}

impl Task {
    /// Create an eagerly completing task without a coordinator.
    pub fn new<F, Fut>(name: impl Into<String>, work: F) -> Self
    where
        F: FnOnce(Task) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::builder(name).build(work)
    }

    pub fn builder(name: impl Into<String>) -> TaskBuilder {
        TaskBuilder {
            name: name.into(),
            mode: CompletionMode::default(),
            coordinator: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn mode(&self) -> CompletionMode {
        self.inner.mode
    }

    pub fn state(&self) -> TaskState {
        self.lock().state
    }

    /// Terminal outcome, if the task has finished.
    pub fn outcome(&self) -> Option<TaskOutcome> {
        self.lock().outcome.clone()
    }

    /// Snapshot of the registered children.
    pub fn children(&self) -> Vec<Task> {
        self.lock().children.clone()
    }

    /// `(terminal children, registered children)` over direct children.
    pub fn progress(&self) -> (usize, usize) {
        let children = self.children();
        let finished = children.iter().filter(|c| c.state().is_terminal()).count();
        (finished, children.len())
    }

    /// Run the work function. Only the first call has an effect.
    ///
    /// Returns `true` if this call started the task.
    pub fn start(&self) -> bool {
        let work = {
            let mut core = self.lock();
            if core.state != TaskState::Pending {
                return false;
            }
            core.state = TaskState::Running;
            core.work.take()
        };

        trace!(task = %self.inner.name, "Task started");
        if let Some(work) = work {
            crate::task::spawn(work(self.clone()));
        }
        true
    }

    /// Mark the task's own work as successful.
    ///
    /// Returns `false` if the task was already completed.
    pub fn done(&self) -> bool {
        self.finish(Ok(()))
    }

    /// Mark the task's own work as failed.
    pub fn fail(&self, error: impl Into<TaskError>) -> bool {
        self.finish(Err(error.into()))
    }

    /// Set the completion handler.
    ///
    /// A handler set after the task became terminal fires right away. Setting
    /// a second handler before completion replaces the first.
    pub fn on_complete<F, Fut>(&self, handler: F)
    where
        F: FnOnce(TaskOutcome) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler: Handler = Box::new(move |outcome| Box::pin(handler(outcome)));

        let late = {
            let mut core = self.lock();
            match core.outcome.clone() {
                Some(outcome) => Some((handler, outcome)),
                None => {
                    core.handler = Some(handler);
                    None
                }
            }
        };

        if let Some((handler, outcome)) = late {
            self.fire(handler, outcome);
        }
    }

    /// Register `child` under this task.
    pub fn add_subtask(&self, child: &Task) {
        if Arc::ptr_eq(&self.inner, &child.inner) {
            warn!(task = %self.inner.name, "Ignoring attempt to add a task as its own subtask");
            return;
        }

        // Lock order is always parent then child.
        let mut core = self.lock();
        let child_open = {
            let mut child_core = child.lock();
            child_core.parent = Arc::downgrade(&self.inner);
            !child_core.state.is_terminal()
        };
        core.children.push(child.clone());
        if child_open {
            core.open_children += 1;
        }
    }

    /// Wait for the task to become terminal.
    pub async fn wait(&self) -> TaskOutcome {
        let mut rx = self.inner.terminal.subscribe();
        let outcome = match rx.wait_for(Option::is_some).await {
            Ok(value) => value.clone(),
            Err(_) => None,
        };
        outcome.unwrap_or_else(|| Err(TaskError::msg("task dropped before completion")))
    }

    /// Wait for this task and then, recursively, for every child registered
    /// by the time it became terminal. Returns this task's own outcome.
    pub fn wait_tree(&self) -> BoxFuture<'_, TaskOutcome> {
        Box::pin(async move {
            let outcome = self.wait().await;
            for child in self.children() {
                let _ = child.wait_tree().await;
            }
            outcome
        })
    }

    fn lock(&self) -> MutexGuard<'_, Core> {
        self.inner.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn finish(&self, outcome: TaskOutcome) -> bool {
        let sealed = {
            let mut core = self.lock();
            if core.state.is_terminal() || core.requested.is_some() {
                return false;
            }
            if self.inner.mode == CompletionMode::WaitForChildren && core.open_children > 0 {
                debug!(
                    task = %self.inner.name,
                    open_children = core.open_children,
                    "Task finished its own work, waiting for children"
                );
                core.requested = Some(outcome);
                return true;
            }
            seal(&mut core, outcome)
        };

        self.publish(sealed);
        true
    }

    fn child_finished(&self) {
        let sealed = {
            let mut core = self.lock();
            core.open_children = core.open_children.saturating_sub(1);
            if core.open_children > 0 || core.state.is_terminal() {
                None
            } else {
                core.requested.take().map(|outcome| seal(&mut core, outcome))
            }
        };

        if let Some(sealed) = sealed {
            self.publish(sealed);
        }
    }

    fn publish(&self, sealed: Sealed) {
        match &sealed.outcome {
            Ok(()) => debug!(task = %self.inner.name, "Task succeeded"),
            Err(e) => debug!(task = %self.inner.name, error = %e, "Task failed"),
        }

        self.inner.terminal.send_replace(Some(sealed.outcome.clone()));

        if let Some(handler) = sealed.handler {
            self.fire(handler, sealed.outcome);
        }

        if let Some(parent) = sealed.parent {
            Task { inner: parent }.child_finished();
        }
    }

    fn fire(&self, handler: Handler, outcome: TaskOutcome) {
        let job = handler(outcome);
        match &self.inner.coordinator {
            Some(coordinator) => {
                if let Err(job) = coordinator.try_dispatch(job) {
                    warn!(
                        task = %self.inner.name,
                        coordinator = %coordinator.name(),
                        "Coordinator stopped, running completion handler on a worker"
                    );
                    crate::task::spawn(job);
                }
            }
            None => {
                crate::task::spawn(job);
            }
        }
    }
}

fn seal(core: &mut Core, outcome: TaskOutcome) -> Sealed {
    core.state = if outcome.is_ok() {
        TaskState::Succeeded
    } else {
        TaskState::Failed
    };
    core.outcome = Some(outcome.clone());
    Sealed {
        outcome,
        handler: core.handler.take(),
        parent: core.parent.upgrade(),
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let core = self.lock();
        f.debug_struct("Task")
            .field("name", &self.inner.name)
            .field("mode", &self.inner.mode)
            .field("state", &core.state)
            .field("children", &core.children.len())
            .finish()
    }
}
