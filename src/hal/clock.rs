//! Monotonic microsecond time source used by the rate gate

use std::time::Instant;

/// Monotonic time in microseconds
pub trait Clock: Send {
    fn now_us(&self) -> u64;
}

/// Clock backed by `std::time::Instant`, starting at zero
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_us(&self) -> u64 {
        self.origin.elapsed().as_micros() as u64
    }
}
