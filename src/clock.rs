use std::cell::Cell;
use std::time::{Duration, Instant};

/// Monotonic time source feeding the game session.
///
/// Readings are measured from an arbitrary fixed origin and never decrease,
/// so intervals come out of plain subtraction. `elapsed` saturates at zero
/// rather than going negative.
pub trait Clock {
    /// Current monotonic reading.
    fn now(&self) -> Duration;

    /// Time passed since an earlier reading, clamped to zero.
    fn elapsed(&self, since: Duration) -> Duration {
        self.now().saturating_sub(since)
    }
}

/// Production clock anchored to a process-local `Instant`.
#[derive(Clone, Copy, Debug)]
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
}

/// Test clock advanced explicitly, so session tests run without wall-clock
/// waits.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.now.get()
    }
}
