use super::handle::Handle;
use super::task::Runnable;

use std::cell::RefCell;
use std::rc::Rc;

thread_local! {
    /// Handle to the event loop currently driving this thread.
    ///
    /// Installed for the duration of `run_until_complete` so that free
    /// functions ([`spawn`](crate::task::spawn), [`sleep`](crate::time::sleep),
    /// ...) can reach the loop without explicit parameter passing.
    static CURRENT_LOOP: RefCell<Option<Handle>> = const { RefCell::new(None) };

    /// The task whose step is executing right now, if any.
    ///
    /// Deferred results consult it when polled so they can register the task
    /// as a waiter and record themselves as its dependency.
    static CURRENT_TASK: RefCell<Option<Rc<dyn Runnable>>> = const { RefCell::new(None) };
}

/// Restores the previous value of a context slot when dropped, so the
/// context unwinds correctly even if the closure panics.
struct Restore<T: 'static> {
    key: &'static std::thread::LocalKey<RefCell<Option<T>>>,
    prev: Option<Option<T>>,
}

impl<T: 'static> Drop for Restore<T> {
    fn drop(&mut self) {
        if let Some(prev) = self.prev.take() {
            self.key.with(|cell| cell.replace(prev));
        }
    }
}

fn enter<T: 'static, R>(
    key: &'static std::thread::LocalKey<RefCell<Option<T>>>,
    value: T,
    f: impl FnOnce() -> R,
) -> R {
    let prev = key.with(|cell| cell.replace(Some(value)));
    let _restore = Restore {
        key,
        prev: Some(prev),
    };

    f()
}

/// Runs `f` with `handle` installed as the current loop.
pub(crate) fn enter_loop<R>(handle: Handle, f: impl FnOnce() -> R) -> R {
    enter(&CURRENT_LOOP, handle, f)
}

/// Runs `f` with `task` installed as the current task.
pub(crate) fn enter_task<R>(task: Rc<dyn Runnable>, f: impl FnOnce() -> R) -> R {
    enter(&CURRENT_TASK, task, f)
}

pub(crate) fn current_task() -> Option<Rc<dyn Runnable>> {
    CURRENT_TASK.with(|cell| cell.borrow().clone())
}

/// Returns a handle to the loop driving the current thread, if any.
pub fn try_current() -> Option<Handle> {
    CURRENT_LOOP.with(|cell| cell.borrow().clone())
}

/// Returns a handle to the loop driving the current thread.
///
/// # Panics
///
/// Panics if called outside of [`EventLoop::run_until_complete`](crate::EventLoop::run_until_complete)
/// or [`EventLoop::block_on`](crate::EventLoop::block_on).
pub fn current() -> Handle {
    try_current().expect("must be called from within a running stepwise event loop")
}
