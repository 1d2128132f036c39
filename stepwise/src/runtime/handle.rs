use super::core::{Core, LoopState};
use super::remote::{Notifier, ReadyToken};
use super::task::core::TaskCore;
use super::task::{Task, TaskInfo};
use super::timer::TimerHandle;
use super::context;
use crate::deferred::Deferred;
use crate::error::Result;

use std::fmt;
use std::future::Future;
use std::rc::{Rc, Weak};
use std::time::{Duration, Instant};

/// A cheap, cloneable reference to an [`EventLoop`](crate::EventLoop).
///
/// Handles are how computations and callbacks talk to their loop: submit
/// tasks, schedule callbacks and timers, create deferred results. Inside a
/// running loop, [`stepwise::handle()`](crate::handle) returns one.
#[derive(Clone)]
pub struct Handle {
    core: Rc<Core>,
}

/// Non-owning [`Handle`], held by deferred results and tasks.
#[derive(Clone)]
pub(crate) struct WeakHandle {
    core: Weak<Core>,
}

impl WeakHandle {
    pub(crate) fn upgrade(&self) -> Option<Handle> {
        self.core.upgrade().map(Handle::new)
    }

    pub(crate) fn ptr_eq(&self, other: &WeakHandle) -> bool {
        self.core.ptr_eq(&other.core)
    }
}

impl Handle {
    pub(crate) fn new(core: Rc<Core>) -> Self {
        Self { core }
    }

    pub(crate) fn core(&self) -> &Core {
        &self.core
    }

    pub(crate) fn downgrade(&self) -> WeakHandle {
        WeakHandle {
            core: Rc::downgrade(&self.core),
        }
    }

    /// Submits `computation` as a new task and queues its first step.
    ///
    /// Never suspends and never runs any part of the computation inline.
    pub fn submit<T, F>(&self, computation: F) -> Task<T>
    where
        T: 'static,
        F: Future<Output = Result<T>> + 'static,
    {
        Task {
            core: TaskCore::submit(self, None, computation),
        }
    }

    /// Like [`submit`](Self::submit), with an explicit task name.
    pub fn submit_named<T, F>(&self, name: impl Into<String>, computation: F) -> Task<T>
    where
        T: 'static,
        F: Future<Output = Result<T>> + 'static,
    {
        Task {
            core: TaskCore::submit(self, Some(name.into()), computation),
        }
    }

    /// Appends `callback` to the tail of the ready queue.
    ///
    /// The callback runs in a later pass than the one that scheduled it.
    pub fn call_soon<F>(&self, callback: F)
    where
        F: FnOnce() + 'static,
    {
        self.core.call_soon(Box::new(callback));
    }

    /// Runs `callback` once `delay` has elapsed on the loop's clock.
    pub fn call_later<F>(&self, delay: Duration, callback: F) -> TimerHandle
    where
        F: FnOnce() + 'static,
    {
        self.call_at(self.now() + delay, callback)
    }

    /// Runs `callback` once the loop's clock reaches `deadline`.
    ///
    /// Callbacks sharing a deadline run in registration order.
    pub fn call_at<F>(&self, deadline: Instant, callback: F) -> TimerHandle
    where
        F: FnOnce() + 'static,
    {
        self.core.call_at(deadline, Box::new(callback))
    }

    /// Current time on the loop's clock (virtual or system).
    pub fn now(&self) -> Instant {
        self.core.now()
    }

    pub fn create_deferred<T: 'static>(&self) -> Deferred<T> {
        Deferred::new(self)
    }

    /// Creates a thread-safe [`Notifier`] for this loop.
    pub fn notifier(&self) -> Notifier {
        Notifier::new(self.core.remote())
    }

    /// Registers `callback` to run on the loop once the returned token is
    /// signalled, possibly from another thread.
    ///
    /// While the token is alive the loop treats it as a pending external
    /// event and does not report a stall.
    pub fn ready_token<F>(&self, callback: F) -> ReadyToken
    where
        F: FnOnce() + 'static,
    {
        let key = self.core.register_token(Box::new(callback));
        ReadyToken::new(key, self.core.remote())
    }

    /// Every unfinished task, ordered by id.
    pub fn all_tasks(&self) -> Vec<TaskInfo> {
        self.core
            .tasks()
            .iter()
            .map(|task| TaskInfo::of(&**task))
            .collect()
    }

    /// The task of this loop whose step is currently executing.
    pub fn current_task(&self) -> Option<TaskInfo> {
        let task = context::current_task()?;
        let this = self.downgrade();
        task.handle()
            .ptr_eq(&this)
            .then(|| TaskInfo::of(&*task))
    }

    /// Number of armed timers.
    pub fn pending_timers(&self) -> usize {
        self.core.pending_timers()
    }

    pub fn state(&self) -> LoopState {
        self.core.state()
    }

    pub fn is_running(&self) -> bool {
        self.state() == LoopState::Running
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
