//! Monotonic millisecond clock for timer and TTL bookkeeping.

use std::time::Instant;

/// Milliseconds elapsed since a process-local origin.
///
/// TTL deadlines and idle timestamps are compared against this clock only,
/// never against wall time, so host clock adjustments cannot expire keys
/// early or keep them alive.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    /// Creates a clock anchored at the current instant.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Returns milliseconds elapsed since the clock origin.
    #[must_use]
    pub fn now_ms(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::MonotonicClock;
    use googletest::prelude::*;
    use rstest::rstest;
    use std::time::Duration;

    #[rstest]
    fn readings_never_decrease() {
        let clock = MonotonicClock::new();
        let first = clock.now_ms();
        std::thread::sleep(Duration::from_millis(5));
        let second = clock.now_ms();
        assert_that!(second >= first, eq(true));
        assert_that!(second >= 5, eq(true));
    }
}
