use crate::deferred::Deferred;
use crate::error::Result;
use crate::runtime::Handle;
use crate::runtime::task::Task;

use std::fmt;
use std::future::Future;

use futures::FutureExt;
use futures::future::LocalBoxFuture;

/// Anything a combinator (or [`EventLoop::run_until_complete`](crate::EventLoop::run_until_complete))
/// accepts as a unit of work.
///
/// Conversions exist from any `Future<Output = Result<T>>`, from [`Task`]
/// and from [`Deferred`], so call sites pass those directly.
pub enum Unit<T> {
    /// Not yet submitted; lifted to a task on normalization.
    Computation(LocalBoxFuture<'static, Result<T>>),
    Task(Task<T>),
    Deferred(Deferred<T>),
}

impl<T: 'static> Unit<T> {
    /// Returns the deferred result standing for this unit, submitting a
    /// computation to `handle`'s loop first.
    pub(crate) fn into_deferred(self, handle: &Handle) -> Deferred<T> {
        match self {
            Unit::Computation(computation) => handle.submit(computation).deferred(),
            Unit::Task(task) => task.deferred(),
            Unit::Deferred(deferred) => deferred,
        }
    }
}

impl<T, F> From<F> for Unit<T>
where
    T: 'static,
    F: Future<Output = Result<T>> + 'static,
{
    fn from(computation: F) -> Self {
        Unit::Computation(computation.boxed_local())
    }
}

impl<T> From<Task<T>> for Unit<T> {
    fn from(task: Task<T>) -> Self {
        Unit::Task(task)
    }
}

impl<T> From<Deferred<T>> for Unit<T> {
    fn from(deferred: Deferred<T>) -> Self {
        Unit::Deferred(deferred)
    }
}

impl<T: 'static> fmt::Debug for Unit<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unit::Computation(_) => f.write_str("Computation(..)"),
            Unit::Task(task) => f.debug_tuple("Task").field(task).finish(),
            Unit::Deferred(deferred) => f.debug_tuple("Deferred").field(deferred).finish(),
        }
    }
}
