use super::builder::LoopBuilder;
use super::clock::Clock;
use super::context;
use super::handle::Handle;
use super::remote::{Remote, Signal};
use super::task::{Runnable, TaskId};
use super::timer::{TimerHandle, TimerQueue};
use super::Callback;
use crate::combinator::Unit;
use crate::error::{Error, Result};
use crate::utils::Slab;

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::future::Future;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, trace, warn};

/// Run state of an [`EventLoop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoopState {
    /// Created, never driven.
    NotStarted,
    /// Inside `run_until_complete`.
    Running,
    /// Between two runs.
    Stopped,
    /// Shut down; nothing runs anymore.
    Closed,
}

/// A failure stored on a deferred result that nobody ever read.
#[derive(Debug, Clone)]
pub struct Unobserved {
    /// Name of the task (or `"deferred"`) the failure belongs to.
    pub label: String,
    pub error: Error,
}

struct Rejection {
    label: String,
    error: Error,
    observed: Rc<Cell<bool>>,
}

/// Loop state shared by [`EventLoop`] and every [`Handle`].
pub(crate) struct Core {
    state: Cell<LoopState>,

    /// Callbacks to run, in order. Only [`Core::run_pass`] drains it.
    ready: RefCell<VecDeque<Callback>>,

    timers: RefCell<TimerQueue>,
    clock: Clock,

    /// Thread-safe inbox for wakers, notifiers and ready tokens.
    remote: Arc<Remote>,

    /// Unfinished tasks, by id.
    tasks: RefCell<BTreeMap<TaskId, Rc<dyn Runnable>>>,

    /// Callbacks waiting for their [`ReadyToken`](crate::ReadyToken).
    tokens: RefCell<Slab<Callback>>,

    next_task_id: Cell<u64>,
    rejections: RefCell<Vec<Rejection>>,
    slow_callback: Option<Duration>,

    /// Number of ready-queue passes so far.
    pass: Cell<u64>,
}

impl Core {
    pub(crate) fn new(virtual_time: bool, slow_callback: Option<Duration>) -> Self {
        Self {
            state: Cell::new(LoopState::NotStarted),
            ready: RefCell::new(VecDeque::new()),
            timers: RefCell::new(TimerQueue::new()),
            clock: Clock::new(virtual_time),
            remote: Arc::new(Remote::new()),
            tasks: RefCell::new(BTreeMap::new()),
            tokens: RefCell::new(Slab::with_capacity(16)),
            next_task_id: Cell::new(1),
            rejections: RefCell::new(Vec::new()),
            slow_callback,
            pass: Cell::new(0),
        }
    }

    pub(crate) fn state(&self) -> LoopState {
        self.state.get()
    }

    pub(crate) fn now(&self) -> Instant {
        self.clock.now()
    }

    pub(crate) fn remote(&self) -> Arc<Remote> {
        self.remote.clone()
    }

    /// Appends `callback` to the ready queue. Dropped once the loop is closed.
    pub(crate) fn call_soon(&self, callback: Callback) {
        if self.state.get() == LoopState::Closed {
            trace!("event loop is closed; dropping callback");
            return;
        }

        self.ready.borrow_mut().push_back(callback);
    }

    pub(crate) fn call_at(&self, deadline: Instant, callback: Callback) -> TimerHandle {
        self.timers.borrow_mut().push(deadline, callback)
    }

    pub(crate) fn pending_timers(&self) -> usize {
        self.timers.borrow().len()
    }

    pub(crate) fn register_token(&self, callback: Callback) -> usize {
        self.tokens.borrow_mut().insert(callback)
    }

    pub(crate) fn next_task_id(&self) -> TaskId {
        let id = self.next_task_id.get();
        self.next_task_id.set(id + 1);
        TaskId::new(id)
    }

    pub(crate) fn register_task(&self, task: Rc<dyn Runnable>) {
        self.tasks.borrow_mut().insert(task.id(), task);
    }

    pub(crate) fn unregister_task(&self, id: TaskId) {
        let task = self.tasks.borrow_mut().remove(&id);
        drop(task);
    }

    pub(crate) fn tasks(&self) -> Vec<Rc<dyn Runnable>> {
        self.tasks.borrow().values().cloned().collect()
    }

    /// Remembers a rejection so that [`EventLoop::shutdown`] can report it if
    /// it is never read.
    pub(crate) fn track_rejection(&self, label: String, error: Error, observed: Rc<Cell<bool>>) {
        let mut rejections = self.rejections.borrow_mut();
        rejections.retain(|rejection| !rejection.observed.get());
        rejections.push(Rejection {
            label,
            error,
            observed,
        });
    }

    fn begin_run(&self) -> Result<()> {
        match self.state.get() {
            LoopState::Running => Err(Error::InvalidState("event loop is already running")),
            LoopState::Closed => Err(Error::InvalidState("event loop is closed")),
            LoopState::NotStarted | LoopState::Stopped => {
                self.state.set(LoopState::Running);
                Ok(())
            }
        }
    }

    /// Runs loop iterations until `done` returns `true`.
    fn drive(&self, done: impl Fn() -> bool) -> Result<()> {
        while !done() {
            self.run_once()?;
        }
        Ok(())
    }

    /// One loop iteration: collect signals, idle if there is nothing to do,
    /// move due timers to the ready queue, then run one pass.
    fn run_once(&self) -> Result<()> {
        self.collect_signals();

        if self.ready.borrow().is_empty() {
            self.idle()?;
            self.collect_signals();
        }

        let due = self.timers.borrow_mut().pop_due(self.clock.now());
        self.ready.borrow_mut().extend(due);

        self.run_pass();
        Ok(())
    }

    /// Blocks until the next deadline or an external signal.
    fn idle(&self) -> Result<()> {
        let next = self.timers.borrow_mut().next_deadline();
        let now = self.clock.now();

        match next {
            Some(deadline) if deadline <= now => {}
            Some(deadline) if self.clock.is_virtual() => {
                trace!(jump = ?(deadline - now), "advancing virtual clock");
                self.clock.advance_to(deadline);
            }
            Some(deadline) => self.remote.park(Some(deadline - now)),
            None if self.is_stalled() => {
                debug!(tasks = self.tasks.borrow().len(), "event loop stalled");
                return Err(Error::Stalled);
            }
            None => self.remote.park(None),
        }

        Ok(())
    }

    /// Nothing queued, no timers, and nobody outside the loop who could
    /// still deliver a signal.
    fn is_stalled(&self) -> bool {
        // Notifiers are counted before the inbox is checked: a producer
        // always pushes before dropping its notifier.
        self.remote.live_notifiers() == 0
            && !self.remote.has_signals()
            && self.tokens.borrow().is_empty()
            && self.ready.borrow().is_empty()
            && self.timers.borrow_mut().next_deadline().is_none()
            && !self.tasks.borrow().values().any(|task| task.awaits_foreign())
    }

    fn collect_signals(&self) {
        for signal in self.remote.take() {
            match signal {
                Signal::Wake(id) => {
                    let task = self.tasks.borrow().get(&id).cloned();
                    if let Some(task) = task {
                        task.schedule();
                    }
                }
                Signal::Ready(key) => {
                    let callback = self.tokens.borrow_mut().remove(key);
                    if let Some(callback) = callback {
                        self.call_soon(callback);
                    }
                }
                Signal::Abandon(key) => {
                    let callback = self.tokens.borrow_mut().remove(key);
                    drop(callback);
                }
                Signal::Call(callback) => self.call_soon(callback),
            }
        }
    }

    /// Runs the callbacks that were queued when the pass started. Anything
    /// they schedule waits for the next pass.
    fn run_pass(&self) {
        let pass = self.pass.get() + 1;
        self.pass.set(pass);

        let len = self.ready.borrow().len();
        for _ in 0..len {
            let Some(callback) = self.ready.borrow_mut().pop_front() else {
                break;
            };
            self.run_callback(pass, callback);
        }
    }

    fn run_callback(&self, pass: u64, callback: Callback) {
        let started = Instant::now();

        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(callback)) {
            let error = Error::from_panic(payload);
            error!(pass, %error, "callback panicked");
        }

        if let Some(threshold) = self.slow_callback {
            let elapsed = started.elapsed();
            if elapsed >= threshold {
                warn!(pass, ?elapsed, "callback blocked the event loop");
            }
        }
    }

    fn take_unobserved(&self) -> Vec<Unobserved> {
        mem::take(&mut *self.rejections.borrow_mut())
            .into_iter()
            .filter(|rejection| !rejection.observed.get())
            .map(|rejection| Unobserved {
                label: rejection.label,
                error: rejection.error,
            })
            .collect()
    }

    /// Marks the loop closed and drops everything it still owns.
    ///
    /// Queues are swapped out before being dropped: destructors of pending
    /// callbacks and computations may call back into the loop.
    fn close(&self) {
        self.state.set(LoopState::Closed);

        let ready = mem::take(&mut *self.ready.borrow_mut());
        let tasks = mem::take(&mut *self.tasks.borrow_mut());
        let tokens = mem::replace(&mut *self.tokens.borrow_mut(), Slab::with_capacity(0));
        let mut timers = mem::replace(&mut *self.timers.borrow_mut(), TimerQueue::new());
        let signals = self.remote.take();

        timers.clear();
        drop((ready, tasks, tokens, timers, signals));
    }
}

/// A single-threaded event loop.
///
/// `EventLoop` owns the ready queue, the deadline queue and the registry
/// of live tasks. It is driven by [`run_until_complete`](Self::run_until_complete)
/// (or [`block_on`](Self::block_on)), which must be called on the thread that
/// created the loop. [`Handle`]s give cheap access to the same loop from
/// inside computations and callbacks.
///
/// Dropping the loop performs a [`shutdown`](Self::shutdown).
pub struct EventLoop {
    core: Rc<Core>,
}

impl EventLoop {
    /// Creates an event loop with the default configuration.
    pub fn new() -> Self {
        LoopBuilder::new().build()
    }

    /// Returns a [`LoopBuilder`] for custom configuration.
    pub fn builder() -> LoopBuilder {
        LoopBuilder::new()
    }

    pub(crate) fn from_core(core: Core) -> Self {
        Self {
            core: Rc::new(core),
        }
    }

    pub fn handle(&self) -> Handle {
        Handle::new(self.core.clone())
    }

    pub fn state(&self) -> LoopState {
        self.core.state()
    }

    /// Drives the loop until `root` completes and returns its outcome.
    ///
    /// `root` may be a computation (submitted as a task), a [`Task`](crate::Task)
    /// or a [`Deferred`](crate::Deferred).
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] if the loop is already running or closed.
    /// - [`Error::Stalled`] if nothing left in the loop can complete `root`.
    /// - Otherwise whatever failure `root` finished with.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use stepwise::EventLoop;
    ///
    /// let rt = EventLoop::new();
    /// let value = rt.run_until_complete(async { Ok("done") }).unwrap();
    /// assert_eq!(value, "done");
    /// ```
    pub fn run_until_complete<T, U>(&self, root: U) -> Result<T>
    where
        T: Clone + 'static,
        U: Into<Unit<T>>,
    {
        self.core.begin_run()?;

        let handle = self.handle();
        let outcome = context::enter_loop(handle.clone(), || {
            let root = Into::<Unit<T>>::into(root).into_deferred(&handle);
            debug!("event loop running");

            self.core.drive(|| root.is_done()).map(|()| root)
        });

        self.core.state.set(LoopState::Stopped);
        debug!(passes = self.core.pass.get(), "event loop stopped");

        outcome?.result()
    }

    /// Runs `future` to completion on this loop.
    ///
    /// Unlike [`run_until_complete`](Self::run_until_complete) the future
    /// does not need to produce a `Result`.
    ///
    /// # Errors
    ///
    /// The same loop-level failures as `run_until_complete`, plus
    /// [`Error::Panicked`] if the future panicked.
    pub fn block_on<F>(&self, future: F) -> Result<F::Output>
    where
        F: Future + 'static,
        F::Output: 'static,
    {
        let slot = Rc::new(RefCell::new(None));
        let output = slot.clone();

        let root = self.handle().submit(async move {
            *output.borrow_mut() = Some(future.await);
            Ok(())
        });

        self.run_until_complete(root)?;

        slot.borrow_mut()
            .take()
            .ok_or(Error::InvalidState("root future produced no output"))
    }

    /// Cancels every remaining task, drives the loop until they have unwound,
    /// and closes the loop.
    ///
    /// Returns (and logs at `error` level) every failure that was stored on
    /// a deferred result but never read. Calling `shutdown` on a closed loop
    /// returns an empty list.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidState`] if called from inside the running loop.
    pub fn shutdown(&self) -> Result<Vec<Unobserved>> {
        match self.core.state.get() {
            LoopState::Running => {
                return Err(Error::InvalidState("cannot shut down a running event loop"));
            }
            LoopState::Closed => return Ok(Vec::new()),
            LoopState::NotStarted | LoopState::Stopped => {}
        }

        let tasks = self.core.tasks();
        if !tasks.is_empty() {
            debug!(tasks = tasks.len(), "cancelling remaining tasks");
            self.core.state.set(LoopState::Running);

            context::enter_loop(self.handle(), || {
                for task in tasks {
                    let _ = task.request_cancel();
                }

                if let Err(error) = self.core.drive(|| self.core.tasks.borrow().is_empty()) {
                    warn!(%error, "tasks did not finish unwinding");
                }
            });
        }

        let unobserved = self.core.take_unobserved();
        for entry in &unobserved {
            error!(task = %entry.label, error = %entry.error, "failure was never retrieved");
        }

        self.core.close();
        debug!("event loop closed");

        Ok(unobserved)
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

impl fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLoop")
            .field("state", &self.core.state())
            .field("tasks", &self.core.tasks.borrow().len())
            .field("timers", &self.core.pending_timers())
            .finish()
    }
}
