//! Tasks: computations driven step by step by the event loop.
//!
//! A task owns a suspendable computation (any `Future` producing
//! `Result<T>`) and a [`Deferred`](crate::Deferred) that receives its
//! outcome. Each step polls the computation once; when it suspends on a
//! deferred result, the task registers itself as that deferred result's
//! continuation and is stepped again once it completes.
//!
//! Most users will interact with this module through [`spawn`] or
//! [`Handle::submit`](crate::Handle::submit) and the returned [`Task`].

pub(crate) mod core;
pub(crate) mod handle;
pub(crate) mod set;
pub(crate) mod state;
pub(crate) mod waker;

pub use handle::{Task, TaskInfo};
pub use set::TaskSet;
pub use state::TaskState;

pub use super::spawn_blocking;

use crate::deferred::Dependency;
use crate::error::Result;
use crate::runtime::{WeakHandle, context};

use std::fmt;
use std::future::Future;
use std::rc::{Rc, Weak};
use std::task::Waker;

/// Identifier of a task, unique within its event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u64);

impl TaskId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A task as seen by the loop, independent of its output type.
pub(crate) trait Runnable {
    fn id(&self) -> TaskId;

    fn name(&self) -> &str;

    fn state(&self) -> TaskState;

    fn handle(&self) -> &WeakHandle;

    /// The waker the task polls its computation with.
    fn waker(&self) -> &Waker;

    /// Suspended on something other than a deferred result of this loop,
    /// so only a foreign waker can resume it.
    fn awaits_foreign(&self) -> bool;

    /// Records a deferred result the current step is suspended on.
    fn depend_on(&self, dependency: Weak<dyn Dependency>);

    /// Queues a step, unless one is already queued.
    fn schedule(self: Rc<Self>);

    /// Runs a step right away. Called from continuations, which already
    /// execute on the ready queue.
    fn wakeup(self: Rc<Self>);

    fn request_cancel(self: Rc<Self>) -> Result<()>;
}

/// Submits `computation` to the current event loop.
///
/// # Panics
///
/// Panics if called outside of a running event loop.
///
/// # Examples
///
/// ```rust
/// use stepwise::{EventLoop, task};
///
/// let rt = EventLoop::new();
/// let total = rt
///     .block_on(async {
///         let job = task::spawn(async { Ok(20 + 1) });
///         job.await
///     })
///     .unwrap();
///
/// assert_eq!(total.unwrap(), 21);
/// ```
pub fn spawn<T, F>(computation: F) -> Task<T>
where
    T: 'static,
    F: Future<Output = Result<T>> + 'static,
{
    context::current().submit(computation)
}

/// Like [`spawn`], with an explicit task name.
///
/// # Panics
///
/// Panics if called outside of a running event loop.
pub fn spawn_named<T, F>(name: impl Into<String>, computation: F) -> Task<T>
where
    T: 'static,
    F: Future<Output = Result<T>> + 'static,
{
    context::current().submit_named(name, computation)
}

/// Describes the task whose step is currently executing, if any.
pub fn current() -> Option<TaskInfo> {
    context::current_task().map(|task| TaskInfo::of(&*task))
}
