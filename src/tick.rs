//! A monotonic tick counter drives the outbound-timeout sweep. It is
//! deliberately decoupled from wall-clock time: wall-clock is tracked
//! separately (see `Client::last_message_receive_time`) and never used for
//! deadline arithmetic, so changing the system clock can't perturb timeouts.

use std::time::Instant;

/// An opaque tick value, only meaningful relative to other ticks from the
/// same [`TickSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Tick(u64);

impl Tick {
    pub const ZERO: Tick = Tick(0);

    /// Milliseconds elapsed between `other` and `self`, saturating at 0 if
    /// `other` is later (clock went backwards isn't possible here, but a
    /// stale tick passed in from a test fake might be).
    pub fn saturating_sub(self, other: Tick) -> u64 {
        self.0.saturating_sub(other.0)
    }

    /// Build a tick from a raw millisecond count. Only meant for tests that
    /// need to simulate elapsed time without actually sleeping.
    #[cfg(test)]
    pub(crate) fn from_millis(ms: u64) -> Tick {
        Tick(ms)
    }
}

/// Produces ticks in milliseconds elapsed since the source was created.
pub struct TickSource {
    start: Instant,
}

impl TickSource {
    pub fn new() -> Self {
        TickSource {
            start: Instant::now(),
        }
    }

    pub fn now(&self) -> Tick {
        Tick(self.start.elapsed().as_millis() as u64)
    }
}

impl Default for TickSource {
    fn default() -> Self {
        Self::new()
    }
}
