use super::context;
use crate::deferred::Dependency;
use crate::error::{Error, Result};

use std::cell::Cell;
use std::future::Future;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::task::{Context, Poll};

/// Set when a cancellation reaches a task suspended in [`yield_now`].
#[derive(Default)]
struct Interrupt(Cell<bool>);

impl Dependency for Interrupt {
    fn cancel_dependency(self: Rc<Self>) -> bool {
        self.0.set(true);
        true
    }
}

/// A future that yields execution back to the loop exactly once.
#[derive(Default)]
struct YieldOnce {
    yielded: bool,
    interrupt: Rc<Interrupt>,
}

impl Future for YieldOnce {
    type Output = Result<()>;

    /// On the first poll, the current task re-queues itself at the tail of
    /// the ready queue and returns `Poll::Pending`. On the second poll, the
    /// future completes, with `Error::Cancelled` if the task was cancelled
    /// in between.
    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.yielded {
            if self.interrupt.0.get() {
                return Poll::Ready(Err(Error::Cancelled));
            }
            return Poll::Ready(Ok(()));
        }
        self.yielded = true;

        match context::current_task() {
            Some(task) => {
                let interrupt: Weak<Interrupt> = Rc::downgrade(&self.interrupt);
                task.depend_on(interrupt);
                task.schedule();
            }
            None => cx.waker().wake_by_ref(),
        }

        Poll::Pending
    }
}

/// Yields execution back to the loop.
///
/// Every callback and task step already queued runs before the current
/// task continues. A task cancelled while yielding gets
/// [`Error::Cancelled`] here.
///
/// # Examples
///
/// ```rust
/// use stepwise::{EventLoop, yield_now};
///
/// let rt = EventLoop::new();
/// rt.run_until_complete(async {
///     // Allow other tasks to run
///     yield_now().await
/// })
/// .unwrap();
/// ```
pub async fn yield_now() -> Result<()> {
    YieldOnce::default().await
}
