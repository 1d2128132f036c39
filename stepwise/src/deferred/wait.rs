use super::Deferred;
use crate::error::Result;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Future returned by awaiting a [`Deferred`] or a [`Task`](crate::Task).
///
/// Resolves to the stored value, the stored failure, or
/// [`Error::Cancelled`](crate::Error::Cancelled).
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct Wait<T> {
    deferred: Deferred<T>,
}

impl<T> Wait<T> {
    pub(crate) fn new(deferred: Deferred<T>) -> Self {
        Self { deferred }
    }
}

impl<T: Clone + 'static> Future for Wait<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(outcome) = self.deferred.outcome() {
            return Poll::Ready(outcome);
        }

        self.deferred.register_waiter(cx.waker());
        Poll::Pending
    }
}

impl<T: 'static> fmt::Debug for Wait<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wait")
            .field("deferred", &self.deferred)
            .finish()
    }
}
