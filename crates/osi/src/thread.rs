//! Threads with per-thread event mailboxes.
//!
//! A [`Thread`] wraps a host thread plus an optional private mailbox of
//! [`Event`] records. The mailbox is constructed before the host thread is
//! spawned, so the entry function can never observe its own thread without
//! the mailbox in place. Destroying the last handle after the thread exits
//! destroys the mailbox with it.

use std::cell::RefCell;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::config::EVENT_SEND_TIMEOUT;
use crate::event::{callback, Callback, Event};
use crate::queue::MessageQueue;
use crate::sema::Semaphore;
use crate::time::Timeout;
use crate::timer::Timer;

#[derive(Debug, Error)]
pub enum OsiError {
    #[error("failed to spawn thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Handle to a runtime thread.
///
/// Handles are cheap to clone; equality is identity of the underlying
/// thread.
#[derive(Clone)]
pub struct Thread {
    inner: Arc<ThreadInner>,
}

struct ThreadInner {
    name: String,
    priority: u32,
    mailbox: Option<MessageQueue<Event>>,
}

thread_local! {
    static CURRENT: RefCell<Option<Thread>> = const { RefCell::new(None) };
}

impl Thread {
    /// Spawns a thread running `entry`.
    ///
    /// If `event_count` is non-zero the thread owns a mailbox of that
    /// capacity; otherwise the event operations on the handle fail.
    /// `priority` is recorded for the host scheduler's benefit; the hosted
    /// port does not remap it.
    pub fn spawn(
        name: &str,
        priority: u32,
        stack_size: usize,
        event_count: usize,
        entry: impl FnOnce() + Send + 'static,
    ) -> Result<Thread, OsiError> {
        let mailbox = (event_count > 0).then(|| MessageQueue::new(event_count));
        let thread = Thread {
            inner: Arc::new(ThreadInner {
                name: name.to_owned(),
                priority,
                mailbox,
            }),
        };

        let handle = thread.clone();
        std::thread::Builder::new()
            .name(name.to_owned())
            .stack_size(stack_size)
            .spawn(move || {
                CURRENT.with(|current| *current.borrow_mut() = Some(handle));
                entry();
                CURRENT.with(|current| *current.borrow_mut() = None);
            })?;
        Ok(thread)
    }

    /// Handle of the calling thread, if it was spawned by this runtime.
    pub fn current() -> Option<Thread> {
        CURRENT.with(|current| current.borrow().clone())
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn priority(&self) -> u32 {
        self.inner.priority
    }

    fn is_current(&self) -> bool {
        Thread::current().is_some_and(|t| t == *self)
    }

    /// Posts an event to this thread's mailbox.
    ///
    /// Blocks up to [`EVENT_SEND_TIMEOUT`] while the mailbox is full, then
    /// fails. Sending to the calling thread never blocks: with a full
    /// mailbox it would deadlock by construction, which is fatal.
    pub fn send_event(&self, event: Event) -> bool {
        let Some(mailbox) = &self.inner.mailbox else {
            return false;
        };

        if self.is_current() {
            if mailbox.try_put(event, Timeout::Immediate).is_err() {
                crate::fatal("event send to current thread with full mailbox");
            }
            return true;
        }

        if mailbox
            .try_put(event, Timeout::Duration(EVENT_SEND_TIMEOUT))
            .is_err()
        {
            log::error!("event send to thread {:?} timed out", self.inner.name);
            return false;
        }
        true
    }

    /// Posts an event with an explicit bound.
    pub fn try_send_event(&self, event: Event, timeout: Timeout) -> bool {
        match &self.inner.mailbox {
            Some(mailbox) => mailbox.try_put(event, timeout).is_ok(),
            None => false,
        }
    }

    /// Waits for one event, dispatches it and returns the record.
    ///
    /// Must be called on the thread owning the mailbox. Returns `None` if
    /// the thread has no mailbox.
    pub fn wait_event(&self) -> Option<Event> {
        let mailbox = self.inner.mailbox.as_ref()?;
        Some(mailbox.get().dispatch())
    }

    /// Waits for one event with a bound; `None` on timeout or no mailbox.
    pub fn try_wait_event(&self, timeout: Timeout) -> Option<Event> {
        let mailbox = self.inner.mailbox.as_ref()?;
        Some(mailbox.try_get(timeout)?.dispatch())
    }

    /// Number of events waiting in the mailbox.
    pub fn pending_events(&self) -> usize {
        self.inner
            .mailbox
            .as_ref()
            .map_or(0, MessageQueue::pending)
    }

    /// Free mailbox slots.
    pub fn event_space(&self) -> usize {
        self.inner.mailbox.as_ref().map_or(0, MessageQueue::space)
    }

    /// Posts a function to run the next time this thread waits for events.
    pub fn post_callback(&self, cb: impl Fn() + Send + Sync + 'static) -> bool {
        self.send_event(Event::Callback(callback(cb)))
    }

    /// Sends a quit request. With `wait` the call blocks until the target
    /// thread has seen the record; waiting for oneself fails.
    pub fn send_quit(&self, wait: bool) -> bool {
        if !wait {
            return self.send_event(Event::Quit { ack: None });
        }

        if self.is_current() {
            return false;
        }
        let ack = Semaphore::binary(false);
        if !self.send_event(Event::Quit {
            ack: Some(ack.clone()),
        }) {
            return false;
        }
        ack.acquire();
        true
    }
}

impl PartialEq for Thread {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Thread {}

impl std::fmt::Debug for Thread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Thread")
            .field("name", &self.inner.name)
            .field("priority", &self.inner.priority)
            .field("has_mailbox", &self.inner.mailbox.is_some())
            .finish()
    }
}

/// Yields the remainder of the caller's time slice.
pub fn yield_now() {
    std::thread::yield_now();
}

/// Sleeps using the host tick.
pub fn sleep(duration: Duration) {
    std::thread::sleep(duration);
}

/// Sleeps for `us` microseconds.
///
/// Schedules a one-shot timer signalling a temporary binary semaphore, so
/// the wait suspends instead of spinning.
pub fn sleep_us(us: u32) {
    let sema = Semaphore::binary(false);
    let signal = sema.clone();
    let timer = Timer::new(None, callback(move || signal.release()));
    timer.start_us(us);
    sema.acquire();
}

/// Sleeps with a relaxed deadline: wake-up may be delayed by up to `slack`
/// so the timer service can coalesce it with neighbouring expirations.
pub fn sleep_relaxed(duration: Duration, slack: Duration) {
    let sema = Semaphore::binary(false);
    let signal = sema.clone();
    let timer = Timer::new(None, callback(move || signal.release()));
    timer.start_relaxed(duration, slack);
    sema.acquire();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    #[test]
    fn spawn_without_mailbox_rejects_events() {
        let ran = Arc::new(AtomicUsize::new(0));
        let ran2 = Arc::clone(&ran);
        let thread = Thread::spawn("plain", 10, 64 * 1024, 0, move || {
            ran2.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        assert!(!thread.send_event(Event::None));
        assert!(!thread.post_callback(|| {}));
        assert_eq!(thread.pending_events(), 0);

        while ran.load(Ordering::SeqCst) == 0 {
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn callback_runs_on_target_thread() {
        let done = Semaphore::binary(false);
        let done2 = done.clone();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = Arc::clone(&hits);

        let thread = Thread::spawn("worker", 10, 64 * 1024, 8, move || {
            let me = Thread::current().unwrap();
            loop {
                if let Some(Event::Quit { .. }) = me.wait_event() {
                    break;
                }
            }
            done2.release();
        })
        .unwrap();

        assert!(thread.post_callback(move || {
            hits2.fetch_add(1, Ordering::SeqCst);
        }));
        assert!(thread.send_quit(false));
        done.acquire();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn quit_with_wait_acknowledges() {
        let thread = Thread::spawn("quitter", 10, 64 * 1024, 4, move || {
            let me = Thread::current().unwrap();
            loop {
                if let Some(Event::Quit { .. }) = me.wait_event() {
                    break;
                }
            }
        })
        .unwrap();

        assert!(thread.send_quit(true));
    }

    #[test]
    fn user_events_preserve_send_order() {
        let done = Semaphore::binary(false);
        let done2 = done.clone();
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen2 = Arc::clone(&seen);

        let thread = Thread::spawn("ordered", 10, 64 * 1024, 8, move || {
            let me = Thread::current().unwrap();
            loop {
                match me.wait_event() {
                    Some(Event::User { id, .. }) => seen2.lock().unwrap().push(id),
                    Some(Event::Quit { .. }) => break,
                    _ => {}
                }
            }
            done2.release();
        })
        .unwrap();

        for id in 1..=3 {
            assert!(thread.send_event(Event::User {
                id,
                params: [0; 3]
            }));
        }
        thread.send_quit(false);
        done.acquire();
        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn sleep_us_blocks_for_requested_time() {
        let begin = Instant::now();
        sleep_us(2000);
        assert!(begin.elapsed() >= Duration::from_micros(2000));
    }

    #[test]
    fn sleep_relaxed_wakes_within_slack() {
        let begin = Instant::now();
        sleep_relaxed(Duration::from_millis(5), Duration::from_millis(50));
        let elapsed = begin.elapsed();
        assert!(elapsed >= Duration::from_millis(5));
        assert!(elapsed < Duration::from_secs(2));
    }
}
