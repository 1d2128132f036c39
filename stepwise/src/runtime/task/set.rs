use super::{Task, TaskId};
use crate::error::Result;
use crate::runtime::{Handle, context};

use std::cell::RefCell;
use std::collections::VecDeque;
use std::future::{Future, poll_fn};
use std::rc::Rc;
use std::task::Poll;

/// A collection of tasks that are awaited and cancelled as a group.
///
/// `TaskSet` is useful for scenarios like:
/// - Processing a batch of requests and acting on each result as it lands.
/// - Ensuring background tasks are cancelled when their owner goes away.
/// - Limiting concurrency by spawning and joining in a loop.
///
/// Results are reported in completion order. Dropping the set cancels every
/// task that has not finished.
///
/// # Examples
///
/// ```rust
/// use stepwise::{EventLoop, TaskSet, time};
/// use std::time::Duration;
///
/// let rt = EventLoop::builder().virtual_time(true).build();
///
/// let order = rt
///     .block_on(async {
///         let mut set = TaskSet::new();
///         for ms in [30_u64, 10, 20] {
///             set.spawn(async move {
///                 time::sleep(Duration::from_millis(ms)).await?;
///                 Ok(ms)
///             });
///         }
///
///         let mut order = Vec::new();
///         while let Some(outcome) = set.join_next().await {
///             order.push(outcome.unwrap());
///         }
///         order
///     })
///     .unwrap();
///
/// assert_eq!(order, vec![10, 20, 30]);
/// ```
pub struct TaskSet<T: 'static> {
    tasks: Vec<Task<T>>,
    finished: Rc<RefCell<VecDeque<TaskId>>>,
}

impl<T: 'static> TaskSet<T> {
    pub fn new() -> Self {
        Self {
            tasks: Vec::new(),
            finished: Rc::new(RefCell::new(VecDeque::new())),
        }
    }

    /// Submits `computation` to the current loop and adds it to the set.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a running event loop.
    pub fn spawn<F>(&mut self, computation: F) -> Task<T>
    where
        F: Future<Output = Result<T>> + 'static,
    {
        self.spawn_on(&context::current(), computation)
    }

    /// Submits `computation` to `handle`'s loop and adds it to the set.
    pub fn spawn_on<F>(&mut self, handle: &Handle, computation: F) -> Task<T>
    where
        F: Future<Output = Result<T>> + 'static,
    {
        self.insert(handle.submit(computation))
    }

    /// Adds an already submitted task to the set.
    pub fn insert(&mut self, task: Task<T>) -> Task<T> {
        let finished = self.finished.clone();
        let id = task.id();
        task.add_done_callback(move |_| finished.borrow_mut().push_back(id));

        self.tasks.push(task.clone());
        task
    }

    /// Number of tasks in the set, including finished ones not yet joined.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Requests cancellation of every unfinished task.
    ///
    /// The tasks stay in the set; [`join_next`](Self::join_next) reports
    /// them as cancelled once they have unwound.
    pub fn cancel_all(&self) {
        for task in &self.tasks {
            if !task.is_done() {
                let _ = task.cancel();
            }
        }
    }
}

impl<T: Clone + 'static> TaskSet<T> {
    /// Waits for the next task to finish, removes it from the set and
    /// returns its outcome.
    ///
    /// Returns `None` once the set is empty.
    pub async fn join_next(&mut self) -> Option<Result<T>> {
        poll_fn(|cx| {
            if self.tasks.is_empty() {
                return Poll::Ready(None);
            }

            loop {
                let Some(id) = self.finished.borrow_mut().pop_front() else {
                    break;
                };

                if let Some(index) = self.tasks.iter().position(|task| task.id() == id) {
                    let task = self.tasks.remove(index);
                    return Poll::Ready(Some(task.result()));
                }
            }

            // A finished task whose completion callback is still queued
            // wakes us right after that callback has run.
            for task in &self.tasks {
                task.core.deferred().register_waiter(cx.waker());
            }

            Poll::Pending
        })
        .await
    }

    /// Waits for every task and returns the outcomes in completion order.
    pub async fn join_all(&mut self) -> Vec<Result<T>> {
        let mut outcomes = Vec::with_capacity(self.tasks.len());
        while let Some(outcome) = self.join_next().await {
            outcomes.push(outcome);
        }
        outcomes
    }
}

impl<T: 'static> Default for TaskSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> Drop for TaskSet<T> {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
