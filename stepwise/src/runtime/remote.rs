//! Thread-safe entry points into an event loop.
//!
//! Everything in the loop is single-threaded (`Rc`, `RefCell`). The only
//! state touched from other threads is the [`Remote`] inbox: wakers of
//! foreign futures, [`Notifier`]s, and [`ReadyToken`]s push [`Signal`]s into
//! it and unpark the loop thread, which drains the inbox at the start of
//! every iteration.

use std::fmt;
use std::mem;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::{self, Thread};
use std::time::Duration;

use parking_lot::Mutex;

use super::task::TaskId;

/// A readiness notification delivered to the loop thread.
pub(crate) enum Signal {
    /// A task's waker fired.
    Wake(TaskId),
    /// A [`ReadyToken`] was signalled.
    Ready(usize),
    /// A [`ReadyToken`] was dropped without being signalled.
    Abandon(usize),
    /// A callback submitted through [`Notifier::call_soon`].
    Call(Box<dyn FnOnce() + Send>),
}

pub(crate) struct Remote {
    signals: Mutex<Vec<Signal>>,
    /// The loop thread.
    thread: Thread,
    /// Set by producers, consumed by the loop before parking so that a
    /// wakeup delivered between "inbox empty" and `park()` is not lost.
    notified: AtomicBool,
    /// Live [`Notifier`] clones; any of them may still deliver a signal.
    notifiers: AtomicUsize,
}

impl Remote {
    pub(crate) fn new() -> Self {
        Self {
            signals: Mutex::new(Vec::new()),
            thread: thread::current(),
            notified: AtomicBool::new(false),
            notifiers: AtomicUsize::new(0),
        }
    }

    pub(crate) fn push(&self, signal: Signal) {
        self.signals.lock().push(signal);
        self.notify();
    }

    pub(crate) fn notify(&self) {
        if !self.notified.swap(true, Ordering::Release) {
            self.thread.unpark();
        }
    }

    pub(crate) fn take(&self) -> Vec<Signal> {
        mem::take(&mut *self.signals.lock())
    }

    pub(crate) fn has_signals(&self) -> bool {
        !self.signals.lock().is_empty()
    }

    pub(crate) fn live_notifiers(&self) -> usize {
        self.notifiers.load(Ordering::Acquire)
    }

    /// Blocks the loop thread until notified or until `timeout` elapses.
    ///
    /// Spurious returns are fine: the caller re-checks its queues.
    pub(crate) fn park(&self, timeout: Option<Duration>) {
        if self.notified.swap(false, Ordering::Acquire) {
            return;
        }

        match timeout {
            Some(timeout) => thread::park_timeout(timeout),
            None => thread::park(),
        }

        self.notified.store(false, Ordering::Release);
    }
}

/// Thread-safe handle for pushing work into an event loop from outside it.
///
/// A `Notifier` is `Send + Sync` and may be cloned freely. While any clone is
/// alive the loop will wait for it instead of reporting a stall.
///
/// # Examples
///
/// ```rust
/// use stepwise::EventLoop;
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use std::sync::Arc;
///
/// let rt = EventLoop::new();
/// let handle = rt.handle();
/// let flag = Arc::new(AtomicBool::new(false));
///
/// let done = handle.create_deferred::<()>();
/// let notifier = handle.notifier();
/// let token = {
///     let done = done.clone();
///     handle.ready_token(move || {
///         let _ = done.resolve(());
///     })
/// };
///
/// let seen = flag.clone();
/// std::thread::spawn(move || {
///     notifier.call_soon(move || seen.store(true, Ordering::SeqCst));
///     token.signal();
/// });
///
/// rt.run_until_complete(done).unwrap();
/// assert!(flag.load(Ordering::SeqCst));
/// ```
pub struct Notifier {
    remote: Arc<Remote>,
}

impl Notifier {
    pub(crate) fn new(remote: Arc<Remote>) -> Self {
        remote.notifiers.fetch_add(1, Ordering::AcqRel);
        Self { remote }
    }

    /// Schedules `callback` on the loop's ready queue (thread-safe `call_soon`).
    pub fn call_soon<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.remote.push(Signal::Call(Box::new(callback)));
    }

    /// Interrupts an idle loop without scheduling anything.
    pub fn wake(&self) {
        self.remote.notify();
    }
}

impl Clone for Notifier {
    fn clone(&self) -> Self {
        Notifier::new(self.remote.clone())
    }
}

impl Drop for Notifier {
    fn drop(&mut self) {
        self.remote.notifiers.fetch_sub(1, Ordering::AcqRel);
        // A loop waiting on this notifier must re-check whether it stalled.
        self.remote.notify();
    }
}

impl fmt::Debug for Notifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifier").finish_non_exhaustive()
    }
}

/// One-shot external readiness signal.
///
/// Created by [`Handle::ready_token`](crate::Handle::ready_token) together with a
/// loop-side callback. Calling [`signal`](Self::signal) from any thread moves
/// that callback onto the ready queue. Dropping the token unsignalled discards
/// the callback.
#[must_use = "an unsignalled ready token discards its callback when dropped"]
pub struct ReadyToken {
    key: usize,
    remote: Arc<Remote>,
    signalled: bool,
}

impl ReadyToken {
    pub(crate) fn new(key: usize, remote: Arc<Remote>) -> Self {
        Self {
            key,
            remote,
            signalled: false,
        }
    }

    /// Marks the external event as ready.
    pub fn signal(mut self) {
        self.signalled = true;
        self.remote.push(Signal::Ready(self.key));
    }
}

impl Drop for ReadyToken {
    fn drop(&mut self) {
        if !self.signalled {
            self.remote.push(Signal::Abandon(self.key));
        }
    }
}

impl fmt::Debug for ReadyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadyToken").field("key", &self.key).finish()
    }
}
