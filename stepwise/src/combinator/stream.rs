use super::Unit;
use crate::deferred::{Deferred, Wait};
use crate::error::Result;
use crate::runtime::{Handle, WeakHandle};

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::future::{Future, IntoFuture};
use std::iter::FusedIterator;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use futures::Stream;

struct Arrivals<T> {
    /// Inputs that completed before anyone asked for them.
    done: VecDeque<Deferred<T>>,

    /// Placeholders handed out before their input completed, oldest first.
    waiting: VecDeque<Deferred<T>>,
}

/// Deferred results in completion order, as returned by
/// [`Handle::stream_completed`].
///
/// Each item is a deferred result standing for "the next input to
/// complete"; awaiting the items in order yields the outcomes in completion
/// order. [`into_stream`](Self::into_stream) turns it into a [`Stream`] of
/// those outcomes. Either way the sequence is finite, each input is produced
/// exactly once, and it cannot be restarted.
pub struct Completed<T> {
    arrivals: Rc<RefCell<Arrivals<T>>>,
    remaining: usize,
    handle: WeakHandle,
}

/// [`Stream`] view of [`Completed`].
#[must_use = "streams do nothing unless polled"]
pub struct CompletedStream<T> {
    completed: Completed<T>,
    current: Option<Wait<T>>,
}

impl Handle {
    /// Yields `units` in the order they complete.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use futures::StreamExt;
    /// use stepwise::{EventLoop, Unit, time};
    /// use std::time::Duration;
    ///
    /// let rt = EventLoop::builder().virtual_time(true).build();
    /// let handle = rt.handle();
    ///
    /// let order = rt
    ///     .block_on(async move {
    ///         let units = [30_u64, 10, 20].map(|ms| {
    ///             Unit::from(async move { time::sleep(Duration::from_millis(ms)).await.map(|()| ms) })
    ///         });
    ///
    ///         let outcomes = handle.stream_completed(units).into_stream();
    ///         outcomes.map(|outcome| outcome.unwrap()).collect::<Vec<_>>().await
    ///     })
    ///     .unwrap();
    ///
    /// assert_eq!(order, vec![10, 20, 30]);
    /// ```
    pub fn stream_completed<T, I, U>(&self, units: I) -> Completed<T>
    where
        T: Clone + 'static,
        I: IntoIterator<Item = U>,
        U: Into<Unit<T>>,
    {
        let inputs: Vec<Deferred<T>> = units
            .into_iter()
            .map(|unit| Into::<Unit<T>>::into(unit).into_deferred(self))
            .collect();

        let arrivals = Rc::new(RefCell::new(Arrivals {
            done: VecDeque::new(),
            waiting: VecDeque::new(),
        }));

        for input in &inputs {
            let arrivals = arrivals.clone();
            input.add_done_callback(move |input| {
                let placeholder = arrivals.borrow_mut().waiting.pop_front();
                match placeholder {
                    Some(placeholder) => input.forward_to(&placeholder),
                    None => arrivals.borrow_mut().done.push_back(input.clone()),
                }
            });
        }

        Completed {
            arrivals,
            remaining: inputs.len(),
            handle: self.downgrade(),
        }
    }
}

impl<T: Clone + 'static> Iterator for Completed<T> {
    type Item = Deferred<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let mut arrivals = self.arrivals.borrow_mut();
        if let Some(input) = arrivals.done.pop_front() {
            return Some(input);
        }

        let placeholder = Deferred::with_handle(self.handle.clone());
        placeholder.seal();
        arrivals.waiting.push_back(placeholder.clone());
        Some(placeholder)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<T: Clone + 'static> ExactSizeIterator for Completed<T> {}

impl<T: Clone + 'static> FusedIterator for Completed<T> {}

impl<T: Clone + 'static> Completed<T> {
    /// Awaits each item in turn, yielding outcomes in completion order.
    pub fn into_stream(self) -> CompletedStream<T> {
        CompletedStream {
            completed: self,
            current: None,
        }
    }
}

impl<T: Clone + 'static> Stream for CompletedStream<T> {
    type Item = Result<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.current.is_none() {
            match self.completed.next() {
                Some(next) => self.current = Some(next.into_future()),
                None => return Poll::Ready(None),
            }
        }

        let Some(current) = self.current.as_mut() else {
            return Poll::Ready(None);
        };

        match Pin::new(current).poll(cx) {
            Poll::Ready(outcome) => {
                self.current = None;
                Poll::Ready(Some(outcome))
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = self.completed.remaining + usize::from(self.current.is_some());
        (len, Some(len))
    }
}

impl<T> fmt::Debug for Completed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completed")
            .field("remaining", &self.remaining)
            .finish_non_exhaustive()
    }
}

impl<T> fmt::Debug for CompletedStream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletedStream")
            .field("completed", &self.completed)
            .field("in_flight", &self.current.is_some())
            .finish()
    }
}
