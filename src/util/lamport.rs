use std::fmt::{Debug, Formatter};
use std::ops::{Add, Sub};

/// A Lamport timestamp: a monotonically increasing logical counter local to a
/// single component. At 1000 ticks per second a u64 overflows after well over
/// a million years, so wraparound is not a concern.
///
/// NB: Timestamps start at 1, so that 0 stays available as a "before any
///  tick" sentinel in protocol messages.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct LamportTimestamp(u64);

impl LamportTimestamp {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl Default for LamportTimestamp {
    fn default() -> Self {
        LamportTimestamp(1)
    }
}

impl Debug for LamportTimestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "T{}", self.0)
    }
}

impl Add<u64> for LamportTimestamp {
    type Output = LamportTimestamp;

    fn add(self, ticks: u64) -> LamportTimestamp {
        LamportTimestamp(self.0 + ticks)
    }
}

impl Sub for LamportTimestamp {
    type Output = u64;

    /// difference in ticks; saturates at 0 rather than going negative
    fn sub(self, rhs: LamportTimestamp) -> u64 {
        self.0.saturating_sub(rhs.0)
    }
}

/// Owns a [LamportTimestamp] and advances it. Used exclusively within
/// single-threaded component regions, so there is no synchronization.
#[derive(Debug, Default)]
pub struct LamportClock {
    current: LamportTimestamp,
}

impl LamportClock {
    pub fn new() -> LamportClock {
        LamportClock::default()
    }

    pub fn tick(&mut self) -> LamportTimestamp {
        self.current = self.current + 1;
        self.current
    }

    pub fn now(&self) -> LamportTimestamp {
        self.current
    }
}
