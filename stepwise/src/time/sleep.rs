use crate::deferred::Wait;
use crate::error::Result;
use crate::runtime::{Handle, TimerHandle, context};

use std::fmt;
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

/// Creates a future that completes after `duration` on the current loop's
/// clock.
///
/// A zero duration completes on the next pass of the ready queue, which
/// makes `sleep(Duration::ZERO)` a way to let every already queued callback
/// run first.
///
/// # Panics
///
/// Panics if called outside of a running event loop.
///
/// # Examples
///
/// ```rust
/// use stepwise::{EventLoop, time};
/// use std::time::Duration;
///
/// let rt = EventLoop::builder().virtual_time(true).build();
/// rt.run_until_complete(async {
///     time::sleep(Duration::from_secs(60)).await
/// })
/// .unwrap();
/// ```
pub fn sleep(duration: Duration) -> Sleep {
    context::current().sleep(duration)
}

/// Like [`sleep`], completing once the loop's clock reaches `deadline`.
///
/// # Panics
///
/// Panics if called outside of a running event loop.
pub fn sleep_until(deadline: Instant) -> Sleep {
    context::current().sleep_until(deadline)
}

impl Handle {
    /// A [`Sleep`] on this loop. See [`time::sleep`](crate::time::sleep).
    pub fn sleep(&self, duration: Duration) -> Sleep {
        if duration.is_zero() {
            return Sleep::next_pass(self);
        }

        self.sleep_until(self.now() + duration)
    }

    /// A [`Sleep`] on this loop that completes at `deadline`.
    pub fn sleep_until(&self, deadline: Instant) -> Sleep {
        let deferred = self.create_deferred::<()>();

        let fire = deferred.clone();
        let timer = self.call_at(deadline, move || {
            let _ = fire.resolve(());
        });

        let on_cancel = timer.clone();
        deferred.set_cancel_hook(Box::new(move || {
            on_cancel.cancel();
            false
        }));

        Sleep {
            deadline,
            timer: Some(timer),
            wait: deferred.into_future(),
        }
    }
}

/// A future that completes once a deadline is reached.
///
/// The timer is registered when the `Sleep` is created and cancelled if the
/// future is dropped first. If the task awaiting it is cancelled, the sleep
/// completes with [`Error::Cancelled`](crate::Error::Cancelled).
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct Sleep {
    deadline: Instant,
    timer: Option<TimerHandle>,
    wait: Wait<()>,
}

impl Sleep {
    fn next_pass(handle: &Handle) -> Self {
        let deferred = handle.create_deferred::<()>();

        let fire = deferred.clone();
        handle.call_soon(move || {
            let _ = fire.resolve(());
        });

        Sleep {
            deadline: handle.now(),
            timer: None,
            wait: deferred.into_future(),
        }
    }

    /// The instant at which the sleep completes.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }
}

impl Future for Sleep {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.wait).poll(cx)
    }
}

impl Drop for Sleep {
    fn drop(&mut self) {
        if let Some(timer) = &self.timer {
            timer.cancel();
        }
    }
}

impl fmt::Debug for Sleep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sleep")
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

