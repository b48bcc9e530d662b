use std::time::{Duration, Instant};

/// Time source for the calibration polling loops.
///
/// `now` is measured from an arbitrary fixed origin; only differences are
/// meaningful.
pub trait Clock {
    fn now(&self) -> Duration;
    fn sleep(&self, duration: Duration);
}

/// Monotonic wall time with real sleeps.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[cfg(test)]
pub use manual::ManualClock;

#[cfg(test)]
mod manual {
    use std::cell::Cell;
    use std::rc::Rc;
    use std::time::Duration;

    use super::Clock;

    /// Clock that only moves when slept on. Clones share the same time, so a
    /// synthetic sampler can read it.
    #[derive(Debug, Clone, Default)]
    pub struct ManualClock {
        now: Rc<Cell<Duration>>,
    }

    impl ManualClock {
        pub fn advance(&self, by: Duration) {
            self.now.set(self.now.get() + by);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Duration {
            self.now.get()
        }

        fn sleep(&self, duration: Duration) {
            self.advance(duration);
        }
    }
}
