//! Time utilities driven by the event loop's deadline queue.
//!
//! - [`sleep`] / [`sleep_until`] suspend the current task until a deadline,
//! - [`timeout`] bounds how long a future may take.
//!
//! Both follow the loop's clock, so they run instantly under a loop built
//! with [`LoopBuilder::virtual_time`](crate::LoopBuilder::virtual_time).

mod sleep;
mod timeout;

#[doc(inline)]
pub use sleep::{Sleep, sleep, sleep_until};

#[doc(inline)]
pub use timeout::{Timeout, timeout};
