//! Counting and binary semaphores.

use std::sync::Arc;
use std::time::Instant;

use crate::sync::{Condvar, Mutex};
use crate::time::Timeout;

/// Counting semaphore for signaling and resource counting.
///
/// The count stays within `0..=max`; [`release`](Semaphore::release)
/// saturates at the maximum instead of failing, so repeated releases before
/// a waiter runs collapse into one.
///
/// Handles are cheap to clone and all clones refer to the same semaphore.
pub struct Semaphore {
    inner: Arc<SemInner>,
}

struct SemInner {
    max: usize,
    count: Mutex<usize>,
    avail: Condvar,
}

impl Semaphore {
    /// Creates a semaphore with the given maximum and initial count.
    ///
    /// # Panics
    ///
    /// Panics if `max` is zero.
    pub fn new(max: usize, init: usize) -> Self {
        assert!(max > 0, "semaphore maximum count must be non-zero");
        Self {
            inner: Arc::new(SemInner {
                max,
                count: Mutex::new(init.min(max)),
                avail: Condvar::new(),
            }),
        }
    }

    /// Creates a binary semaphore (`max = 1`).
    pub fn binary(available: bool) -> Self {
        Self::new(1, usize::from(available))
    }

    /// Acquires the semaphore, blocking until the count is positive.
    pub fn acquire(&self) {
        let mut count = self.inner.count.lock();
        while *count == 0 {
            count = self.inner.avail.wait(count);
        }
        *count -= 1;
    }

    /// Acquires with a bound. Returns false on timeout.
    pub fn try_acquire(&self, timeout: Timeout) -> bool {
        let mut count = self.inner.count.lock();
        if *count > 0 {
            *count -= 1;
            return true;
        }

        match timeout {
            Timeout::Immediate => false,
            Timeout::Forever => {
                while *count == 0 {
                    count = self.inner.avail.wait(count);
                }
                *count -= 1;
                true
            }
            Timeout::Duration(d) => {
                let deadline = Instant::now() + d;
                loop {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    let (guard, _) = self.inner.avail.wait_timeout(count, deadline - now);
                    count = guard;
                    if *count > 0 {
                        *count -= 1;
                        return true;
                    }
                }
            }
        }
    }

    /// Releases the semaphore, saturating at the maximum count.
    pub fn release(&self) {
        let mut count = self.inner.count.lock();
        if *count < self.inner.max {
            *count += 1;
        }
        drop(count);
        self.inner.avail.notify_one();
    }

    /// Current count.
    pub fn count(&self) -> usize {
        *self.inner.count.lock()
    }
}

impl Clone for Semaphore {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn release_then_acquire() {
        let sem = Semaphore::new(4, 0);
        assert_eq!(sem.count(), 0);
        sem.release();
        sem.release();
        assert_eq!(sem.count(), 2);
        sem.acquire();
        assert_eq!(sem.count(), 1);
    }

    #[test]
    fn release_saturates_at_max() {
        let sem = Semaphore::binary(true);
        sem.release();
        sem.release();
        assert_eq!(sem.count(), 1);
        assert!(sem.try_acquire(Timeout::Immediate));
        assert!(!sem.try_acquire(Timeout::Immediate));
    }

    #[test]
    fn timed_acquire_expires() {
        let sem = Semaphore::new(1, 0);
        assert!(!sem.try_acquire(Timeout::Duration(Duration::from_millis(20))));
    }

    #[test]
    fn acquire_wakes_waiter() {
        let sem = Semaphore::new(1, 0);
        let sem2 = sem.clone();
        let waiter = std::thread::spawn(move || {
            sem2.acquire();
        });
        std::thread::sleep(Duration::from_millis(10));
        sem.release();
        waiter.join().unwrap();
        assert_eq!(sem.count(), 0);
    }
}
