use super::waker::make_waker;
use super::{Runnable, TaskId, TaskState};
use crate::deferred::{Deferred, Dependency};
use crate::error::{Error, Result};
use crate::runtime::{Handle, WeakHandle, context};

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};
use std::task::{Context, Poll, Waker};

use futures::FutureExt;
use futures::future::LocalBoxFuture;
use tracing::{debug, trace, warn};

/// Loop-side state of a submitted computation.
///
/// Every field is touched only from the loop thread. The `RefCell` around
/// the computation is borrowed for the duration of a poll; nothing reachable
/// from inside the computation touches it.
pub(crate) struct TaskCore<T> {
    id: TaskId,
    name: String,
    state: Cell<TaskState>,

    /// A step is sitting on the ready queue.
    scheduled: Cell<bool>,

    cancel_requested: Cell<bool>,

    /// The pending cancellation was handed to a dependency, so the next step
    /// resumes the computation (which then observes `Error::Cancelled`)
    /// instead of dropping it.
    cancel_delivered: Cell<bool>,

    /// See [`Runnable::awaits_foreign`].
    foreign: Cell<bool>,

    computation: RefCell<Option<LocalBoxFuture<'static, Result<T>>>>,

    /// Deferred results the last step suspended on.
    dependencies: RefCell<Vec<Weak<dyn Dependency>>>,

    deferred: Deferred<T>,
    waker: Waker,
    handle: WeakHandle,
}

impl<T: 'static> TaskCore<T> {
    /// Creates the task, registers it with the loop and queues its first step.
    pub(crate) fn submit<F>(handle: &Handle, name: Option<String>, computation: F) -> Rc<Self>
    where
        F: Future<Output = Result<T>> + 'static,
    {
        let core = handle.core();
        let id = core.next_task_id();
        let name = name.unwrap_or_else(|| format!("Task-{id}"));

        let deferred = Deferred::new(handle);
        deferred.seal();
        deferred.set_label(name.clone());

        let task = Rc::new(Self {
            id,
            name,
            state: Cell::new(TaskState::Created),
            scheduled: Cell::new(false),
            cancel_requested: Cell::new(false),
            cancel_delivered: Cell::new(false),
            foreign: Cell::new(false),
            computation: RefCell::new(Some(computation.boxed_local())),
            dependencies: RefCell::new(Vec::new()),
            deferred,
            waker: make_waker(id, core.remote()),
            handle: handle.downgrade(),
        });

        let weak = Rc::downgrade(&task);
        task.deferred.set_cancel_hook(Box::new(move || {
            weak.upgrade()
                .is_some_and(|task| task.cancel().is_ok())
        }));

        core.register_task(task.clone());
        trace!(task = %id, name = %task.name, "task submitted");

        task.clone().schedule();
        task
    }

    pub(crate) fn deferred(&self) -> &Deferred<T> {
        &self.deferred
    }

    /// Executes one step of the computation.
    fn step(self: Rc<Self>) {
        if self.state.get().is_terminal() {
            return;
        }

        self.scheduled.set(false);
        self.foreign.set(false);
        self.dependencies.borrow_mut().clear();

        if self.cancel_requested.get() && !self.cancel_delivered.get() {
            self.abort();
            return;
        }

        self.cancel_requested.set(false);
        self.cancel_delivered.set(false);
        self.state.set(TaskState::Running);

        let poll = {
            let mut slot = self.computation.borrow_mut();
            let Some(computation) = slot.as_mut() else {
                return;
            };

            let mut cx = Context::from_waker(&self.waker);
            context::enter_task(self.clone(), || {
                panic::catch_unwind(AssertUnwindSafe(|| computation.as_mut().poll(&mut cx)))
            })
        };

        match poll {
            Ok(Poll::Pending) => self.suspend(),
            Ok(Poll::Ready(outcome)) => self.finish(outcome),
            Err(payload) => {
                let error = Error::from_panic(payload);
                warn!(task = %self.id, name = %self.name, %error, "computation panicked");
                self.finish(Err(error));
            }
        }
    }

    fn suspend(self: &Rc<Self>) {
        let waiting_on_loop = !self.dependencies.borrow().is_empty();
        self.foreign.set(!waiting_on_loop && !self.scheduled.get());

        if self.cancel_requested.get() {
            // `cancel()` was called while this step was running.
            self.state.set(TaskState::Cancelling);
            self.deliver_cancel();
        } else {
            self.state.set(TaskState::Suspended);
        }
    }

    /// Drops the computation without resuming it and finishes as cancelled.
    fn abort(self: &Rc<Self>) {
        debug!(task = %self.id, name = %self.name, "dropping computation");

        let computation = self.computation.borrow_mut().take();
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(move || drop(computation))) {
            let error = Error::from_panic(payload);
            warn!(task = %self.id, %error, "computation panicked while being dropped");
        }

        self.finish(Err(Error::Cancelled));
    }

    fn finish(self: &Rc<Self>, outcome: Result<T>) {
        let computation = self.computation.borrow_mut().take();
        drop(computation);
        self.dependencies.borrow_mut().clear();
        self.foreign.set(false);

        let state = match &outcome {
            Err(Error::Cancelled) => TaskState::Cancelled,
            _ => TaskState::Done,
        };
        self.state.set(state);
        debug!(task = %self.id, name = %self.name, %state, "task finished");

        if let Err(error) = self.deferred.settle_outcome(outcome) {
            warn!(task = %self.id, %error, "task outcome was already set");
        }

        if let Some(handle) = self.handle.upgrade() {
            handle.core().unregister_task(self.id);
        }
    }

    /// Requests cancellation. Idempotent until the task finishes.
    pub(crate) fn cancel(self: &Rc<Self>) -> Result<()> {
        let state = self.state.get();

        if state.is_terminal() {
            return Err(Error::InvalidState("cannot cancel a finished task"));
        }

        if self.cancel_requested.replace(true) {
            return Ok(());
        }

        debug!(task = %self.id, name = %self.name, "cancellation requested");

        if state == TaskState::Running {
            // Delivered by `suspend` once the current poll returns.
            return Ok(());
        }

        self.state.set(TaskState::Cancelling);
        self.deliver_cancel();
        Ok(())
    }

    /// Cancels what the task is suspended on. Without a live dependency to
    /// cancel, a step is queued which drops the computation.
    fn deliver_cancel(self: &Rc<Self>) {
        let dependencies = mem::take(&mut *self.dependencies.borrow_mut());

        let delivered = dependencies
            .into_iter()
            .filter_map(|dependency| dependency.upgrade())
            .fold(false, |delivered, dependency| {
                dependency.cancel_dependency() || delivered
            });

        self.cancel_delivered.set(delivered);

        if !delivered {
            self.clone().schedule();
        }
    }
}

impl<T: 'static> Runnable for TaskCore<T> {
    fn id(&self) -> TaskId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> TaskState {
        self.state.get()
    }

    fn handle(&self) -> &WeakHandle {
        &self.handle
    }

    fn waker(&self) -> &Waker {
        &self.waker
    }

    fn awaits_foreign(&self) -> bool {
        self.foreign.get()
    }

    fn depend_on(&self, dependency: Weak<dyn Dependency>) {
        let mut dependencies = self.dependencies.borrow_mut();
        if !dependencies.iter().any(|known| known.ptr_eq(&dependency)) {
            dependencies.push(dependency);
        }
    }

    fn schedule(self: Rc<Self>) {
        if self.state.get().is_terminal() || self.scheduled.replace(true) {
            return;
        }

        let Some(handle) = self.handle.upgrade() else {
            self.scheduled.set(false);
            return;
        };

        self.foreign.set(false);
        handle.core().call_soon(Box::new(move || self.step()));
    }

    fn wakeup(self: Rc<Self>) {
        self.step();
    }

    fn request_cancel(self: Rc<Self>) -> Result<()> {
        TaskCore::cancel(&self)
    }
}
