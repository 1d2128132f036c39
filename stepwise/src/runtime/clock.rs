use std::cell::Cell;
use std::time::{Duration, Instant};

/// Time source of an event loop.
///
/// The virtual clock never sleeps: when the loop would idle until a
/// deadline, the clock jumps straight to it. Timer ordering is identical
/// under both clocks.
pub(crate) enum Clock {
    System,
    Virtual { origin: Instant, offset: Cell<Duration> },
}

impl Clock {
    pub(crate) fn new(virtual_time: bool) -> Self {
        if virtual_time {
            Clock::Virtual {
                origin: Instant::now(),
                offset: Cell::new(Duration::ZERO),
            }
        } else {
            Clock::System
        }
    }

    pub(crate) fn now(&self) -> Instant {
        match self {
            Clock::System => Instant::now(),
            Clock::Virtual { origin, offset } => *origin + offset.get(),
        }
    }

    pub(crate) fn is_virtual(&self) -> bool {
        matches!(self, Clock::Virtual { .. })
    }

    /// Moves a virtual clock forward to `deadline`. No-op for the system clock
    /// or when `deadline` is already in the past.
    pub(crate) fn advance_to(&self, deadline: Instant) {
        if let Clock::Virtual { origin, offset } = self {
            let target = deadline.saturating_duration_since(*origin);
            if target > offset.get() {
                offset.set(target);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn virtual_clock_only_moves_forward() {
        let clock = Clock::new(true);
        let start = clock.now();

        clock.advance_to(start + Duration::from_secs(5));
        assert_eq!(clock.now(), start + Duration::from_secs(5));

        clock.advance_to(start + Duration::from_secs(1));
        assert_eq!(clock.now(), start + Duration::from_secs(5));
    }

    #[test]
    fn system_clock_ignores_advance() {
        let clock = Clock::new(false);
        let before = clock.now();
        clock.advance_to(before + Duration::from_secs(3600));

        assert!(!clock.is_virtual());
        assert!(clock.now() < before + Duration::from_secs(3600));
    }
}
