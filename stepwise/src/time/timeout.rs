use super::sleep::{Sleep, sleep};
use crate::error::{Error, Result};

use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use pin_project::pin_project;

/// Requires `future` to complete within `duration`.
///
/// Tasks and deferred results can be passed directly.
///
/// If the deadline passes first, the inner future is dropped where it stands
/// and the result is [`Error::Timeout`]. For a timeout that cancels a task
/// and waits for it to unwind, see
/// [`Handle::with_timeout`](crate::Handle::with_timeout).
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
/// let outcome = rt
///     .block_on(async {
///         time::timeout(Duration::from_millis(10), time::sleep(Duration::from_secs(1))).await
///     })
///     .unwrap();
///
/// assert!(outcome.unwrap_err().is_timeout());
/// ```
pub fn timeout<F>(duration: Duration, future: F) -> Timeout<F::IntoFuture>
where
    F: IntoFuture,
{
    Timeout {
        future: future.into_future(),
        sleep: sleep(duration),
    }
}

/// Future returned by [`timeout`].
#[pin_project]
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct Timeout<F> {
    #[pin]
    future: F,
    sleep: Sleep,
}

impl<F: Future> Future for Timeout<F> {
    type Output = Result<F::Output>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();

        if let Poll::Ready(value) = this.future.poll(cx) {
            return Poll::Ready(Ok(value));
        }

        match Pin::new(this.sleep).poll(cx) {
            Poll::Ready(Ok(())) => Poll::Ready(Err(Error::Timeout)),
            Poll::Ready(Err(error)) => Poll::Ready(Err(error)),
            Poll::Pending => Poll::Pending,
        }
    }
}
