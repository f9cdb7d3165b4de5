//! Event records and mailbox dispatch.
//!
//! Threads created with a non-zero event count own a private mailbox of
//! event records. Producers post records; the owning thread drains them via
//! [`Thread::wait_event`](crate::thread::Thread::wait_event) /
//! [`Thread::try_wait_event`](crate::thread::Thread::try_wait_event), which
//! decode the record kind and run the corresponding hook before handing the
//! record back.

use std::fmt;
use std::sync::Arc;

use crate::notify::Notify;
use crate::sema::Semaphore;
use crate::timer::Timer;

/// Shared callback with its context captured by the closure.
pub type Callback = Arc<dyn Fn() + Send + Sync + 'static>;

/// Wraps a closure into a [`Callback`].
pub fn callback(f: impl Fn() + Send + Sync + 'static) -> Callback {
    Arc::new(f)
}

/// One mailbox record, copied by value across the queue boundary.
#[derive(Clone)]
pub enum Event {
    /// A record whose payload was consumed during dispatch.
    None,
    /// Application-defined record; the params are opaque to the runtime.
    User { id: u32, params: [usize; 3] },
    /// A timer expired; dispatch forwards to the timer invocation hook.
    Timer(Timer),
    /// Run a function on the receiving thread.
    Callback(Callback),
    /// A notification became pending; dispatch consults its status.
    Notify(Notify),
    /// Ask the receiving thread to quit. `ack` is released once the record
    /// is seen, for senders that wait for acknowledgement.
    Quit { ack: Option<Semaphore> },
}

impl Event {
    /// Dispatches the record and returns what the waiter should see.
    ///
    /// `Callback` and `Notify` records are consumed here and come back as
    /// [`Event::None`]; the other kinds pass through so the receiving loop
    /// can branch on them.
    pub(crate) fn dispatch(self) -> Event {
        match self {
            Event::Timer(timer) => {
                crate::timer::invoke(&timer);
                Event::Timer(timer)
            }
            Event::Callback(cb) => {
                cb();
                Event::None
            }
            Event::Notify(notify) => {
                crate::notify::dispatch(&notify);
                Event::None
            }
            Event::Quit { ack } => {
                if let Some(sema) = &ack {
                    sema.release();
                }
                Event::Quit { ack }
            }
            other => other,
        }
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::None => f.write_str("None"),
            Event::User { id, params } => f
                .debug_struct("User")
                .field("id", id)
                .field("params", params)
                .finish(),
            Event::Timer(_) => f.write_str("Timer"),
            Event::Callback(_) => f.write_str("Callback"),
            Event::Notify(_) => f.write_str("Notify"),
            Event::Quit { ack } => f
                .debug_struct("Quit")
                .field("acknowledged", &ack.is_some())
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn callback_record_is_consumed() {
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = Arc::clone(&hits);
        let event = Event::Callback(callback(move || {
            hits2.fetch_add(1, Ordering::SeqCst);
        }));
        assert!(matches!(event.dispatch(), Event::None));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn quit_record_releases_ack() {
        let ack = Semaphore::binary(false);
        let event = Event::Quit {
            ack: Some(ack.clone()),
        };
        assert!(matches!(event.dispatch(), Event::Quit { .. }));
        assert_eq!(ack.count(), 1);
    }

    #[test]
    fn user_record_passes_through() {
        let event = Event::User {
            id: 42,
            params: [1, 2, 3],
        };
        match event.dispatch() {
            Event::User { id, params } => {
                assert_eq!(id, 42);
                assert_eq!(params, [1, 2, 3]);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
