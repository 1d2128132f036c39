//! Offloading blocking work to helper threads.
//!
//! The loop never runs blocking work itself. The work runs on a dedicated
//! thread and hands its outcome back through a [`ReadyToken`](crate::ReadyToken),
//! so the loop treats it like any other external readiness event.

use super::{Handle, context};
use crate::deferred::Deferred;
use crate::error::Error;

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use tracing::{trace, warn};

/// Runs `work` on a helper thread; see [`Handle::spawn_blocking`].
///
/// # Panics
///
/// Panics if called outside of a running event loop.
pub fn spawn_blocking<T, F>(work: F) -> Deferred<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    context::current().spawn_blocking(work)
}

impl Handle {
    /// Runs `work` on a helper thread and returns a deferred result that
    /// completes with its return value.
    ///
    /// A panic inside `work` rejects the deferred result with
    /// [`Error::Panicked`]. Cancelling the deferred result does not stop the
    /// thread; its outcome is discarded.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use stepwise::EventLoop;
    ///
    /// let rt = EventLoop::new();
    /// let handle = rt.handle();
    ///
    /// let sum = handle.spawn_blocking(|| (1..=100_u64).sum::<u64>());
    /// assert_eq!(rt.run_until_complete(sum).unwrap(), 5050);
    /// ```
    pub fn spawn_blocking<T, F>(&self, work: F) -> Deferred<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let deferred = self.create_deferred::<T>();
        deferred.seal();
        deferred.set_label("blocking");

        let slot: Arc<Mutex<Option<thread::Result<T>>>> = Arc::new(Mutex::new(None));

        let outcome = slot.clone();
        let target = deferred.clone();
        let token = self.ready_token(move || {
            let settled = match outcome.lock().take() {
                Some(Ok(value)) => target.settle_outcome(Ok(value)),
                Some(Err(payload)) => target.settle_outcome(Err(Error::from_panic(payload))),
                None => Ok(()),
            };

            if settled.is_err() {
                trace!("blocking work finished after its result was cancelled");
            }
        });

        let spawned = thread::Builder::new()
            .name("stepwise-blocking".to_string())
            .spawn(move || {
                let result = panic::catch_unwind(AssertUnwindSafe(work));
                *slot.lock() = Some(result);
                token.signal();
            });

        if let Err(error) = spawned {
            warn!(%error, "failed to start a blocking worker thread");
            let _ = deferred.settle_outcome(Err(Error::new(error)));
        }

        deferred
    }
}

