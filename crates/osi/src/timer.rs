//! One-shot and relaxed timers.
//!
//! A timer either runs its callback on the service thread, or, when bound to
//! a [`Thread`], fires by posting a [`Event::Timer`] record which the owning
//! thread's dispatcher forwards back here via [`invoke`]. Relaxed timers may
//! fire up to `slack` late so the service can batch them with neighbouring
//! expirations.

use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use crate::event::{Callback, Event};
use crate::sync::{Condvar, Mutex};
use crate::thread::Thread;
use crate::time::Timeout;

/// One-shot timer handle.
#[derive(Clone)]
pub struct Timer {
    inner: Arc<TimerInner>,
}

struct TimerInner {
    target: Option<Thread>,
    cb: Callback,
    state: Mutex<TimerState>,
}

#[derive(Default)]
struct TimerState {
    /// Bumped on every start/stop; stale service entries compare unequal.
    generation: u64,
    armed: bool,
    /// A `Timer` event is in some mailbox and has not been invoked yet.
    pending_invoke: bool,
}

impl Timer {
    /// Creates a stopped timer.
    ///
    /// With a `target` thread, expiry posts a timer event to that thread
    /// and `cb` runs during its event dispatch; without one, `cb` runs on
    /// the timer service thread.
    pub fn new(target: Option<Thread>, cb: Callback) -> Self {
        Self {
            inner: Arc::new(TimerInner {
                target,
                cb,
                state: Mutex::new(TimerState::default()),
            }),
        }
    }

    /// Starts (or restarts) the timer to fire after `period`.
    pub fn start(&self, period: Duration) {
        self.arm(period, Duration::ZERO);
    }

    /// Starts the timer with a microsecond period.
    pub fn start_us(&self, us: u32) {
        self.arm(Duration::from_micros(u64::from(us)), Duration::ZERO);
    }

    /// Starts the timer with a coalescing window: the expiry may be
    /// delayed by up to `slack`.
    pub fn start_relaxed(&self, period: Duration, slack: Duration) {
        self.arm(period, slack);
    }

    /// Stops the timer and cancels a not-yet-invoked expiry.
    pub fn stop(&self) {
        let mut state = self.inner.state.lock();
        state.generation += 1;
        state.armed = false;
        state.pending_invoke = false;
    }

    pub fn is_armed(&self) -> bool {
        self.inner.state.lock().armed
    }

    fn arm(&self, period: Duration, slack: Duration) {
        let generation = {
            let mut state = self.inner.state.lock();
            state.generation += 1;
            state.armed = true;
            state.pending_invoke = false;
            state.generation
        };
        let due = Instant::now() + period;
        service().schedule(Entry {
            due,
            wake: due + slack,
            generation,
            timer: self.clone(),
        });
    }
}

/// Timer event invocation hook, called from the event dispatcher.
pub(crate) fn invoke(timer: &Timer) {
    {
        let mut state = timer.inner.state.lock();
        if !state.pending_invoke {
            return;
        }
        state.pending_invoke = false;
    }
    (timer.inner.cb)();
}

struct Entry {
    /// Earliest instant the timer may fire.
    due: Instant,
    /// Latest instant the service must wake for it (`due + slack`).
    wake: Instant,
    generation: u64,
    timer: Timer,
}

struct TimerService {
    entries: Mutex<Vec<Entry>>,
    wakeup: Condvar,
}

impl TimerService {
    fn schedule(&self, entry: Entry) {
        self.entries.lock().push(entry);
        self.wakeup.notify_one();
    }

    fn run(&self) {
        let mut entries = self.entries.lock();
        loop {
            if entries.is_empty() {
                entries = self.wakeup.wait(entries);
                continue;
            }

            let now = Instant::now();
            let next_wake = entries.iter().map(|e| e.wake).min();
            let anything_due = entries.iter().any(|e| e.wake <= now);
            if !anything_due {
                // Sleep until the nearest mandatory wake-up; a new entry
                // re-evaluates the deadline.
                let wait = next_wake.expect("non-empty entry list") - now;
                let (guard, _) = self.wakeup.wait_timeout(entries, wait);
                entries = guard;
                continue;
            }

            // Fire everything inside its window; relaxed entries whose due
            // has passed coalesce with the expiry that woke us.
            let mut fired = Vec::new();
            entries.retain(|e| {
                if e.due <= now {
                    fired.push(Entry {
                        due: e.due,
                        wake: e.wake,
                        generation: e.generation,
                        timer: e.timer.clone(),
                    });
                    false
                } else {
                    true
                }
            });
            drop(entries);
            for entry in fired {
                fire(entry);
            }
            entries = self.entries.lock();
        }
    }
}

fn fire(entry: Entry) {
    let timer = entry.timer;
    {
        let mut state = timer.inner.state.lock();
        if state.generation != entry.generation || !state.armed {
            return;
        }
        state.armed = false;
        if timer.inner.target.is_some() {
            state.pending_invoke = true;
        }
    }

    match &timer.inner.target {
        Some(thread) => {
            if !thread.try_send_event(Event::Timer(timer.clone()), Timeout::Immediate) {
                log::warn!("timer event dropped: mailbox of {:?} is full", thread.name());
                timer.inner.state.lock().pending_invoke = false;
            }
        }
        None => (timer.inner.cb)(),
    }
}

fn service() -> &'static TimerService {
    static SERVICE: OnceLock<&'static TimerService> = OnceLock::new();
    SERVICE.get_or_init(|| {
        let service: &'static TimerService = Box::leak(Box::new(TimerService {
            entries: Mutex::new(Vec::new()),
            wakeup: Condvar::new(),
        }));
        std::thread::Builder::new()
            .name("osi-timer".into())
            .spawn(move || service.run())
            .expect("failed to spawn timer service");
        service
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::callback;
    use crate::sema::Semaphore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn one_shot_fires_once() {
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = Arc::clone(&hits);
        let done = Semaphore::binary(false);
        let done2 = done.clone();

        let timer = Timer::new(
            None,
            callback(move || {
                hits2.fetch_add(1, Ordering::SeqCst);
                done2.release();
            }),
        );
        timer.start(Duration::from_millis(5));
        assert!(done.try_acquire(Timeout::Duration(Duration::from_secs(2))));
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(!timer.is_armed());
    }

    #[test]
    fn stop_cancels_pending_fire() {
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = Arc::clone(&hits);
        let timer = Timer::new(
            None,
            callback(move || {
                hits2.fetch_add(1, Ordering::SeqCst);
            }),
        );
        timer.start(Duration::from_millis(50));
        timer.stop();
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn restart_supersedes_previous_schedule() {
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = Arc::clone(&hits);
        let done = Semaphore::binary(false);
        let done2 = done.clone();

        let timer = Timer::new(
            None,
            callback(move || {
                hits2.fetch_add(1, Ordering::SeqCst);
                done2.release();
            }),
        );
        timer.start(Duration::from_millis(30));
        timer.start(Duration::from_millis(5));
        assert!(done.try_acquire(Timeout::Duration(Duration::from_secs(2))));
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn thread_bound_timer_invokes_via_dispatch() {
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = Arc::clone(&hits);
        let done = Semaphore::binary(false);
        let done2 = done.clone();

        let thread = Thread::spawn("timer-owner", 10, 64 * 1024, 4, move || {
            let me = Thread::current().unwrap();
            loop {
                match me.try_wait_event(Timeout::Duration(Duration::from_secs(2))) {
                    Some(Event::Timer(_)) => {
                        done2.release();
                        break;
                    }
                    Some(_) => continue,
                    None => break,
                }
            }
        })
        .unwrap();

        let timer = Timer::new(
            Some(thread),
            callback(move || {
                hits2.fetch_add(1, Ordering::SeqCst);
            }),
        );
        timer.start(Duration::from_millis(5));
        assert!(done.try_acquire(Timeout::Duration(Duration::from_secs(2))));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
