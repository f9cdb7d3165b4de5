//! Timeouts, elapsed timers and tick conversion.

use std::time::{Duration, Instant};

use crate::config::TICK_HZ;

/// Bound for a blocking operation.
///
/// Every blocking call with a timeout accepts the non-blocking form and the
/// indefinite form; the `Duration` form decays across retry loops (see
/// [`ElapsedTimer`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// Do not block; fail or return partial results immediately.
    Immediate,
    /// Block for at most this long.
    Duration(Duration),
    /// Block until the operation completes.
    Forever,
}

impl Timeout {
    pub fn from_millis(ms: u64) -> Self {
        Self::Duration(Duration::from_millis(ms))
    }

    /// Remaining budget after `elapsed` has passed. `None` means exhausted.
    ///
    /// `Immediate` is always exhausted; `Forever` never is.
    pub fn remaining(self, elapsed: Duration) -> Option<Timeout> {
        match self {
            Timeout::Immediate => None,
            Timeout::Forever => Some(Timeout::Forever),
            Timeout::Duration(d) => d
                .checked_sub(elapsed)
                .filter(|rem| !rem.is_zero())
                .map(Timeout::Duration),
        }
    }
}

/// Measures time elapsed since it was started. Used to decay a timeout over
/// a sequence of partial waits.
#[derive(Debug, Clone, Copy)]
pub struct ElapsedTimer {
    start: Instant,
}

impl ElapsedTimer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn restart(&mut self) {
        self.start = Instant::now();
    }
}

/// Converts milliseconds to kernel ticks, rounding up.
pub fn ms_to_ticks(ms: u32) -> u64 {
    if ms == 0 {
        return 0;
    }
    (u64::from(ms) * u64::from(TICK_HZ) + 999) / 1000
}

/// Busy-waits for the given number of microseconds.
pub fn delay_us(us: u32) {
    let deadline = Instant::now() + Duration::from_micros(u64::from(us));
    while Instant::now() < deadline {
        std::hint::spin_loop();
    }
}
