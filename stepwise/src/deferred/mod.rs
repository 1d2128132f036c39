//! Single-assignment eventual values.
//!
//! A [`Deferred`] starts out pending and transitions exactly once to
//! resolved, rejected, or cancelled. Interested parties register callbacks
//! with [`Deferred::add_done_callback`]; on completion every callback is
//! placed on the loop's ready queue in registration order. Callbacks never
//! run inline with the call that completed the deferred result, and
//! registering on an already-complete deferred result schedules the callback
//! the same way, so callers cannot observe a difference between the two.
//!
//! Awaiting a deferred result (it implements [`IntoFuture`]) from inside a
//! task records the deferred result as the task's current dependency. The
//! task becomes the waiter when it polls with its own waker; wakers handed
//! down by combinators such as `FuturesUnordered` are woken instead.

mod wait;

pub use wait::Wait;

use crate::error::{Error, Result};
use crate::runtime::context;
use crate::runtime::{Handle, WeakHandle};
use crate::runtime::task::TaskId;

use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::IntoFuture;
use std::mem;
use std::rc::{Rc, Weak};
use std::task::Waker;

use tracing::trace;

type DoneCallback<T> = Box<dyn FnOnce(&Deferred<T>)>;

/// Invoked by [`Deferred::cancel`] on deferred results owned by a task or an
/// aggregate. Returns `true` if the owner took over the cancellation.
pub(crate) type CancelHook = Box<dyn Fn() -> bool>;

/// Observable state of a [`Deferred`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeferredState {
    Pending,
    Resolved,
    Rejected,
    Cancelled,
}

enum State<T> {
    Pending,
    Resolved(T),
    Rejected(Error),
    Cancelled,
}

struct Shared<T> {
    state: RefCell<State<T>>,

    /// Continuations, in registration order. Emptied on completion.
    callbacks: RefCell<Vec<DoneCallback<T>>>,

    /// Tasks already registered as waiters, so repeated polls from the same
    /// task do not pile up duplicate continuations.
    waiting_tasks: RefCell<Vec<TaskId>>,

    /// Wakers other than a task's own (children of `FuturesUnordered` and
    /// similar), deduplicated with `Waker::will_wake`.
    waiting_wakers: RefCell<Vec<Waker>>,

    cancel_hook: RefCell<Option<CancelHook>>,

    /// Set for deferred results completed only by the runtime (task outcomes,
    /// combinator aggregates). Their public `resolve`/`reject` refuse.
    sealed: Cell<bool>,

    /// Whether anyone has read a stored failure.
    observed: Rc<Cell<bool>>,

    /// Name reported for unobserved failures.
    label: RefCell<Option<String>>,

    handle: WeakHandle,
}

/// A single-assignment container for an eventual value or failure.
///
/// `Deferred` is a cheap reference-counted handle: clones share the same
/// underlying state. It is bound to the event loop it was created on.
///
/// # Examples
///
/// ```rust
/// use stepwise::EventLoop;
///
/// let rt = EventLoop::new();
/// let handle = rt.handle();
///
/// let answer = handle.create_deferred::<u32>();
/// let producer = answer.clone();
/// handle.call_soon(move || {
///     producer.resolve(42).unwrap();
/// });
///
/// assert_eq!(rt.run_until_complete(answer).unwrap(), 42);
/// ```
pub struct Deferred<T> {
    shared: Rc<Shared<T>>,
}

impl<T: 'static> Deferred<T> {
    /// Creates a pending deferred result bound to `handle`'s loop.
    pub fn new(handle: &Handle) -> Self {
        Self::with_handle(handle.downgrade())
    }

    pub(crate) fn with_handle(handle: WeakHandle) -> Self {
        Self {
            shared: Rc::new(Shared {
                state: RefCell::new(State::Pending),
                callbacks: RefCell::new(Vec::new()),
                waiting_tasks: RefCell::new(Vec::new()),
                waiting_wakers: RefCell::new(Vec::new()),
                cancel_hook: RefCell::new(None),
                sealed: Cell::new(false),
                observed: Rc::new(Cell::new(false)),
                label: RefCell::new(None),
                handle,
            }),
        }
    }

    pub fn state(&self) -> DeferredState {
        match &*self.shared.state.borrow() {
            State::Pending => DeferredState::Pending,
            State::Resolved(_) => DeferredState::Resolved,
            State::Rejected(_) => DeferredState::Rejected,
            State::Cancelled => DeferredState::Cancelled,
        }
    }

    /// Returns `true` once the deferred result has left the pending state.
    pub fn is_done(&self) -> bool {
        self.state() != DeferredState::Pending
    }

    pub fn is_cancelled(&self) -> bool {
        self.state() == DeferredState::Cancelled
    }

    /// Completes the deferred result with `value`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidState`] if it is already complete or owned by a task.
    pub fn resolve(&self, value: T) -> Result<()> {
        self.ensure_unsealed()?;
        self.settle(State::Resolved(value))
    }

    /// Completes the deferred result with a failure.
    ///
    /// Rejecting with [`Error::Cancelled`] is the same as cancelling.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidState`] if it is already complete or owned by a task.
    pub fn reject(&self, error: Error) -> Result<()> {
        self.ensure_unsealed()?;
        self.settle_outcome(Err(error))
    }

    /// Cancels the deferred result.
    ///
    /// For the deferred result of a task, this requests cancellation of the
    /// task; the state changes once the task has unwound. Aggregates created
    /// by combinators cancel their inputs.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidState`] if it is already complete.
    pub fn cancel(&self) -> Result<()> {
        if self.is_done() {
            return Err(Error::InvalidState("cannot cancel a completed deferred result"));
        }

        let hook = self.shared.cancel_hook.borrow_mut().take();

        if let Some(hook) = hook {
            let forwarded = hook();

            if self.is_done() {
                return Ok(());
            }

            self.shared.cancel_hook.borrow_mut().get_or_insert(hook);

            if forwarded {
                return Ok(());
            }
        }

        self.settle(State::Cancelled)
    }

    /// Registers `callback` to run once the deferred result completes.
    ///
    /// The callback always runs from the ready queue, even if the deferred
    /// result is already complete.
    pub fn add_done_callback<F>(&self, callback: F)
    where
        F: FnOnce(&Deferred<T>) + 'static,
    {
        self.push_callback(Box::new(callback));
    }

    /// Returns the stored failure, if the deferred result failed.
    ///
    /// Cancellation is reported as [`Error::Cancelled`]. Reading the failure
    /// marks it as observed.
    pub fn error(&self) -> Option<Error> {
        let error = match &*self.shared.state.borrow() {
            State::Rejected(error) => error.clone(),
            State::Cancelled => Error::Cancelled,
            State::Pending | State::Resolved(_) => return None,
        };

        self.shared.observed.set(true);
        Some(error)
    }

    pub(crate) fn settle_outcome(&self, outcome: Result<T>) -> Result<()> {
        match outcome {
            Ok(value) => self.settle(State::Resolved(value)),
            Err(Error::Cancelled) => self.settle(State::Cancelled),
            Err(error) => self.settle(State::Rejected(error)),
        }
    }

    pub(crate) fn seal(&self) {
        self.shared.sealed.set(true);
    }

    pub(crate) fn set_cancel_hook(&self, hook: CancelHook) {
        *self.shared.cancel_hook.borrow_mut() = Some(hook);
    }

    pub(crate) fn set_label(&self, label: impl Into<String>) {
        *self.shared.label.borrow_mut() = Some(label.into());
    }

    pub(crate) fn as_dependency(&self) -> Weak<dyn Dependency> {
        let dependency: Weak<Shared<T>> = Rc::downgrade(&self.shared);
        dependency
    }

    /// Registers the current waiter.
    ///
    /// Inside one of this loop's tasks, this deferred result is recorded as
    /// a dependency so cancellation reaches it. When `waker` is the task's
    /// own, the task itself becomes the continuation (once per task).
    /// Otherwise, and outside tasks, `waker` is woken on completion.
    pub(crate) fn register_waiter(&self, waker: &Waker) {
        let task = context::current_task().filter(|task| task.handle().ptr_eq(&self.shared.handle));

        let Some(task) = task else {
            self.register_waker(waker);
            return;
        };

        if !self.is_done() {
            task.depend_on(self.as_dependency());
        }

        if !waker.will_wake(task.waker()) {
            self.register_waker(waker);
            return;
        }

        if self.is_done() {
            self.schedule_callback(Box::new(move |_| task.wakeup()));
            return;
        }

        let id = task.id();
        {
            let mut waiting = self.shared.waiting_tasks.borrow_mut();
            if waiting.contains(&id) {
                return;
            }
            waiting.push(id);
        }

        self.push_callback(Box::new(move |_| task.wakeup()));
    }

    fn register_waker(&self, waker: &Waker) {
        if !self.is_done() {
            let mut waiting = self.shared.waiting_wakers.borrow_mut();
            if waiting.iter().any(|known| known.will_wake(waker)) {
                return;
            }
            waiting.push(waker.clone());
        }

        let waker = waker.clone();
        self.push_callback(Box::new(move |_| waker.wake()));
    }

    fn push_callback(&self, callback: DoneCallback<T>) {
        if self.is_done() {
            self.schedule_callback(callback);
        } else {
            self.shared.callbacks.borrow_mut().push(callback);
        }
    }

    fn ensure_unsealed(&self) -> Result<()> {
        if self.shared.sealed.get() {
            return Err(Error::InvalidState(
                "deferred result is completed by the runtime, not by callers",
            ));
        }
        Ok(())
    }

    fn settle(&self, next: State<T>) -> Result<()> {
        {
            let mut state = self.shared.state.borrow_mut();
            if !matches!(*state, State::Pending) {
                return Err(Error::InvalidState("deferred result is already complete"));
            }
            *state = next;
        }

        let hook = self.shared.cancel_hook.borrow_mut().take();
        drop(hook);
        self.shared.waiting_tasks.borrow_mut().clear();
        self.shared.waiting_wakers.borrow_mut().clear();

        let callbacks = mem::take(&mut *self.shared.callbacks.borrow_mut());

        let Some(handle) = self.shared.handle.upgrade() else {
            trace!(
                callbacks = callbacks.len(),
                "event loop is gone; dropping continuations"
            );
            return Ok(());
        };

        if let State::Rejected(error) = &*self.shared.state.borrow() {
            let label = self
                .shared
                .label
                .borrow()
                .clone()
                .unwrap_or_else(|| "deferred".to_string());
            handle
                .core()
                .track_rejection(label, error.clone(), self.shared.observed.clone());
        }

        for callback in callbacks {
            self.schedule_callback_on(&handle, callback);
        }

        Ok(())
    }

    fn schedule_callback(&self, callback: DoneCallback<T>) {
        match self.shared.handle.upgrade() {
            Some(handle) => self.schedule_callback_on(&handle, callback),
            None => trace!("event loop is gone; dropping continuation"),
        }
    }

    fn schedule_callback_on(&self, handle: &Handle, callback: DoneCallback<T>) {
        let this = self.clone();
        handle.call_soon(move || callback(&this));
    }
}

impl<T: Clone + 'static> Deferred<T> {
    /// Returns the value, the stored failure, or [`Error::Cancelled`].
    ///
    /// This never suspends; use `.await` to wait for completion.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidState`] while still pending.
    pub fn result(&self) -> Result<T> {
        self.outcome()
            .unwrap_or(Err(Error::InvalidState("result is not ready")))
    }

    /// The outcome once complete; marks failures as observed.
    pub(crate) fn outcome(&self) -> Option<Result<T>> {
        let outcome = match &*self.shared.state.borrow() {
            State::Pending => return None,
            State::Resolved(value) => Ok(value.clone()),
            State::Rejected(error) => Err(error.clone()),
            State::Cancelled => Err(Error::Cancelled),
        };

        self.shared.observed.set(true);
        Some(outcome)
    }

    /// Copies this (complete) outcome into `target`. No-op while pending or
    /// if `target` is already complete.
    pub(crate) fn forward_to(&self, target: &Deferred<T>) {
        if let Some(outcome) = self.outcome() {
            let _ = target.settle_outcome(outcome);
        }
    }
}

impl<T: Clone + 'static> IntoFuture for Deferred<T> {
    type Output = Result<T>;
    type IntoFuture = Wait<T>;

    fn into_future(self) -> Self::IntoFuture {
        Wait::new(self)
    }
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T: 'static> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("state", &self.state())
            .field("callbacks", &self.shared.callbacks.borrow().len())
            .finish()
    }
}

/// Type-erased view used by tasks to cancel whatever they are suspended on.
pub(crate) trait Dependency {
    /// Returns `true` if the cancellation was accepted.
    fn cancel_dependency(self: Rc<Self>) -> bool;
}

impl<T: 'static> Dependency for Shared<T> {
    fn cancel_dependency(self: Rc<Self>) -> bool {
        Deferred { shared: self }.cancel().is_ok()
    }
}
