//! # Stepwise
//!
//! **Stepwise** is a cooperative, single-threaded event loop for the
//! **Nebula** ecosystem. It multiplexes many independently suspendable
//! computations onto one thread, with deterministic wakeup ordering,
//! per-pass fairness, and cooperative cancellation.
//!
//! The building blocks, from the bottom up:
//!
//! - [`Deferred`]: a single-assignment eventual value with completion callbacks,
//! - [`Task`]: a computation (any `Future<Output = Result<T>>`) that the loop
//!   steps forward each time a deferred result it waits on completes,
//! - [`EventLoop`] / [`Handle`]: the ready queue, the deadline queue, and the
//!   run loop that drains them,
//! - combinators: [`Handle::join_all`], [`Handle::wait_for`],
//!   [`Handle::stream_completed`], [`Handle::with_timeout`].
//!
//! Every continuation goes through the ready queue. A callback scheduled
//! during one pass never runs before the next pass, so no task can starve the
//! others by resolving deferred results in a loop.
//!
//! ## Quick Start
//!
//! ```rust
//! use stepwise::{EventLoop, JoinPolicy, time};
//! use std::time::Duration;
//!
//! let rt = EventLoop::builder().virtual_time(true).build();
//! let handle = rt.handle();
//!
//! let greet = handle.submit_named("greeter", async {
//!     time::sleep(Duration::from_millis(100)).await?;
//!     Ok("hello")
//! });
//! let answer = handle.submit(async { Ok("world") });
//!
//! let all = handle.join_all([greet, answer], JoinPolicy::FailFast);
//! let words: Vec<_> = rt
//!     .run_until_complete(all)
//!     .unwrap()
//!     .into_iter()
//!     .map(Result::unwrap)
//!     .collect();
//!
//! assert_eq!(words, ["hello", "world"]);
//! ```
//!
//! ## Modules
//!
//! - [`task`]: spawning, task handles, [`TaskSet`]
//! - [`time`]: sleep and timeout driven by the loop's clock
//!
//! ## Logging
//!
//! Stepwise emits [`tracing`](https://docs.rs/tracing) events (task
//! lifecycle, slow callbacks, unobserved failures) and never installs a
//! subscriber itself.

mod combinator;
mod deferred;
mod error;
mod runtime;
mod utils;

pub mod time;

pub use combinator::{Completed, CompletedStream, JoinPolicy, Unit, WaitMode, Waited};
pub use deferred::{Deferred, DeferredState, Wait};
pub use error::{Error, Result};
pub use runtime::task::{self, Task, TaskId, TaskInfo, TaskSet, TaskState};
pub use runtime::yield_now::yield_now;
pub use runtime::{
    EventLoop, Handle, LoopBuilder, LoopState, Notifier, ReadyToken, TimerHandle, Unobserved,
};

pub use stepwise_macros::*;

/// Returns a handle to the event loop running on this thread.
///
/// # Panics
///
/// Panics if called outside of a running event loop.
pub fn handle() -> Handle {
    runtime::context::current()
}

/// Like [`handle`], returning `None` outside of a running event loop.
pub fn try_handle() -> Option<Handle> {
    runtime::context::try_current()
}
