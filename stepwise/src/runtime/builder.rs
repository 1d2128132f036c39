use super::core::{Core, EventLoop};

use std::time::Duration;

/// Callbacks running at least this long are reported unless configured otherwise.
const DEFAULT_SLOW_CALLBACK: Duration = Duration::from_millis(100);

/// Builder for configuring and creating an event loop.
///
/// # Examples
///
/// ```rust
/// use stepwise::LoopBuilder;
/// use std::time::Duration;
///
/// let rt = LoopBuilder::new()
///     .virtual_time(true)
///     .slow_callback_duration(Duration::from_millis(50))
///     .build();
/// # drop(rt);
/// ```
#[derive(Debug, Clone)]
pub struct LoopBuilder {
    /// Drive timers from a virtual clock that jumps instead of sleeping.
    virtual_time: bool,

    /// Warn threshold for a single callback or task step.
    slow_callback: Option<Duration>,
}

impl LoopBuilder {
    /// Creates a builder with the default configuration: system clock,
    /// slow-callback warnings at 100ms.
    pub fn new() -> Self {
        Self {
            virtual_time: false,
            slow_callback: Some(DEFAULT_SLOW_CALLBACK),
        }
    }

    /// Uses a virtual clock.
    ///
    /// When the loop has nothing to run but a pending timer, the clock jumps
    /// straight to the timer's deadline instead of sleeping. Ordering of
    /// timers is the same as with the system clock, which makes tests with
    /// long delays instant and deterministic.
    pub fn virtual_time(mut self, enabled: bool) -> Self {
        self.virtual_time = enabled;
        self
    }

    /// Sets the duration above which a single callback is logged as having
    /// blocked the loop.
    ///
    /// # Panics
    ///
    /// Panics if `threshold` is zero.
    pub fn slow_callback_duration(mut self, threshold: Duration) -> Self {
        assert!(!threshold.is_zero(), "slow_callback_duration must be > 0");

        self.slow_callback = Some(threshold);
        self
    }

    /// Turns slow-callback reporting off.
    pub fn disable_slow_callback_warnings(mut self) -> Self {
        self.slow_callback = None;
        self
    }

    pub fn build(self) -> EventLoop {
        EventLoop::from_core(Core::new(self.virtual_time, self.slow_callback))
    }
}

impl Default for LoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}
