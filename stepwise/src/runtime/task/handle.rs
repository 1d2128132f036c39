use super::core::TaskCore;
use super::{Runnable, TaskId, TaskState};
use crate::deferred::{Deferred, Wait};
use crate::error::{Error, Result};

use std::fmt;
use std::future::IntoFuture;
use std::rc::Rc;

/// A handle to a submitted computation.
///
/// Awaiting a `Task` yields its outcome. A task is also usable wherever a
/// deferred result is expected: [`deferred`](Self::deferred) exposes the
/// underlying [`Deferred`], which completes exactly when the task finishes.
///
/// Dropping the handle does **not** cancel the task.
pub struct Task<T> {
    pub(crate) core: Rc<TaskCore<T>>,
}

impl<T: 'static> Task<T> {
    pub fn id(&self) -> TaskId {
        self.core.id()
    }

    /// The task's name: the one given at submission, or `Task-<id>`.
    pub fn name(&self) -> &str {
        Runnable::name(&*self.core)
    }

    pub fn state(&self) -> TaskState {
        self.core.state()
    }

    /// Returns `true` once the task has finished or been cancelled.
    pub fn is_done(&self) -> bool {
        self.core.deferred().is_done()
    }

    pub fn is_cancelled(&self) -> bool {
        self.core.deferred().is_cancelled()
    }

    /// Requests cancellation.
    ///
    /// The task is not cancelled synchronously: whatever it is suspended on
    /// is cancelled, and the next step raises [`Error::Cancelled`] inside
    /// the computation. A computation that has not started yet is dropped
    /// without being polled. Calling `cancel` again before the task has
    /// unwound is a no-op.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidState`] if the task has already finished.
    pub fn cancel(&self) -> Result<()> {
        self.core.cancel()
    }

    /// The deferred result receiving this task's outcome.
    ///
    /// It is completed by the task only; `resolve` and `reject` on it fail.
    pub fn deferred(&self) -> Deferred<T> {
        self.core.deferred().clone()
    }

    pub fn add_done_callback<F>(&self, callback: F)
    where
        F: FnOnce(&Deferred<T>) + 'static,
    {
        self.core.deferred().add_done_callback(callback);
    }

    /// The failure the task finished with, if any.
    pub fn error(&self) -> Option<Error> {
        self.core.deferred().error()
    }

    pub fn info(&self) -> TaskInfo {
        TaskInfo::of(&*self.core)
    }
}

impl<T: Clone + 'static> Task<T> {
    /// The task's outcome, without waiting.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidState`] while the task is still running, otherwise
    /// the failure the task finished with.
    pub fn result(&self) -> Result<T> {
        self.core.deferred().result()
    }
}

impl<T: Clone + 'static> IntoFuture for Task<T> {
    type Output = Result<T>;
    type IntoFuture = Wait<T>;

    fn into_future(self) -> Self::IntoFuture {
        self.core.deferred().clone().into_future()
    }
}

impl<T> Clone for Task<T> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
        }
    }
}

impl<T: 'static> fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("state", &self.state())
            .finish()
    }
}

/// Snapshot of a task, as returned by the introspection APIs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskInfo {
    pub id: TaskId,
    pub name: String,
    pub state: TaskState,
}

impl TaskInfo {
    pub(crate) fn of(task: &dyn Runnable) -> Self {
        Self {
            id: task.id(),
            name: task.name().to_string(),
            state: task.state(),
        }
    }
}
