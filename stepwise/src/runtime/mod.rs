//! Core runtime components.
//!
//! This module contains the event loop and the pieces it is built from:
//! - the ready queue and the run loop ([`EventLoop`], [`Handle`]),
//! - the deadline queue ([`TimerHandle`]) and the loop clock,
//! - tasks and their wakers,
//! - the thread-safe inbox used by [`Notifier`] and [`ReadyToken`],
//! - the ambient "current loop / current task" context.
//!
//! Most users will interact with the re-exports at the crate root rather
//! than with this module directly.

mod blocking;
mod clock;
mod core;
mod handle;
mod remote;
mod timer;

pub(crate) mod builder;
pub(crate) mod context;
pub(crate) mod yield_now;

pub mod task;

pub use blocking::spawn_blocking;
pub use builder::LoopBuilder;
pub use self::core::{EventLoop, LoopState, Unobserved};
pub use handle::Handle;
pub use remote::{Notifier, ReadyToken};
pub use timer::TimerHandle;

pub(crate) use handle::WeakHandle;

/// A zero-argument unit of work on the ready queue or the deadline queue.
pub(crate) type Callback = Box<dyn FnOnce()>;
