//! Recursive mutex with owner tracking.

use std::sync::Arc;
use std::thread::ThreadId;
use std::time::Instant;

use crate::sync::{Condvar, Mutex};
use crate::time::Timeout;

/// Owner-tracked recursive lock.
///
/// The owning thread may re-acquire the lock; each acquisition increments a
/// depth counter and each [`unlock`](RecursiveMutex::unlock) decrements it.
/// Ownership is released when the depth reaches zero.
///
/// Unlocking from a thread that does not own the lock is a programming error;
/// it is ignored in release builds and asserts in debug builds.
pub struct RecursiveMutex {
    inner: Arc<MutexInner>,
}

struct MutexInner {
    state: Mutex<OwnerState>,
    freed: Condvar,
}

#[derive(Default)]
struct OwnerState {
    owner: Option<ThreadId>,
    depth: usize,
}

impl OwnerState {
    fn try_take(&mut self, me: ThreadId) -> bool {
        match self.owner {
            None => {
                self.owner = Some(me);
                self.depth = 1;
                true
            }
            Some(owner) if owner == me => {
                self.depth += 1;
                true
            }
            Some(_) => false,
        }
    }
}

impl RecursiveMutex {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MutexInner {
                state: Mutex::new(OwnerState::default()),
                freed: Condvar::new(),
            }),
        }
    }

    /// Locks, blocking until the mutex is available.
    pub fn lock(&self) {
        let me = std::thread::current().id();
        let mut state = self.inner.state.lock();
        while !state.try_take(me) {
            state = self.inner.freed.wait(state);
        }
    }

    /// Locks with a bound. Returns false on timeout.
    pub fn try_lock(&self, timeout: Timeout) -> bool {
        let me = std::thread::current().id();
        let mut state = self.inner.state.lock();
        if state.try_take(me) {
            return true;
        }

        match timeout {
            Timeout::Immediate => false,
            Timeout::Forever => {
                while !state.try_take(me) {
                    state = self.inner.freed.wait(state);
                }
                true
            }
            Timeout::Duration(d) => {
                let deadline = Instant::now() + d;
                loop {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    let (guard, _) = self.inner.freed.wait_timeout(state, deadline - now);
                    state = guard;
                    if state.try_take(me) {
                        return true;
                    }
                }
            }
        }
    }

    /// Unlocks one level; releases ownership when the depth reaches zero.
    pub fn unlock(&self) {
        let me = std::thread::current().id();
        let mut state = self.inner.state.lock();
        debug_assert_eq!(state.owner, Some(me), "unlock by non-owner");
        if state.owner != Some(me) {
            return;
        }
        state.depth -= 1;
        if state.depth == 0 {
            state.owner = None;
            drop(state);
            self.inner.freed.notify_one();
        }
    }
}

impl Clone for RecursiveMutex {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Default for RecursiveMutex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn recursive_lock_unlock() {
        let mutex = RecursiveMutex::new();
        mutex.lock();
        mutex.lock();
        assert!(mutex.try_lock(Timeout::Immediate));
        mutex.unlock();
        mutex.unlock();
        mutex.unlock();
    }

    #[test]
    fn other_thread_blocks_until_release() {
        let mutex = RecursiveMutex::new();
        mutex.lock();

        let m2 = mutex.clone();
        let contender = std::thread::spawn(move || {
            assert!(!m2.try_lock(Timeout::Duration(Duration::from_millis(10))));
            m2.lock();
            m2.unlock();
        });

        std::thread::sleep(Duration::from_millis(30));
        mutex.unlock();
        contender.join().unwrap();
    }
}
