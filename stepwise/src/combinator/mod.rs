//! Combinators over groups of units of work.
//!
//! Every combinator first normalizes its inputs into deferred results
//! (computations are submitted as tasks), then builds its aggregate purely
//! out of completion callbacks:
//!
//! - [`Handle::join_all`](crate::Handle::join_all) collects every outcome,
//! - [`Handle::wait_for`](crate::Handle::wait_for) splits inputs into done and pending,
//! - [`Handle::stream_completed`](crate::Handle::stream_completed) yields in completion order,
//! - [`Handle::with_timeout`](crate::Handle::with_timeout) bounds a single unit.

mod join;
mod stream;
mod timeout;
mod unit;
mod wait;

pub use join::JoinPolicy;
pub use stream::{Completed, CompletedStream};
pub use unit::Unit;
pub use wait::{WaitMode, Waited};
