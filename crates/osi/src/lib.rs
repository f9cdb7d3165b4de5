#![doc = r#"# osi

OS integration layer: RTOS-style services on top of the host's preemptive
scheduler.

## Module Overview
- [`critical`] – Short nestable critical sections.
- [`sema`]     – Counting and binary semaphores with timed acquire.
- [`mutex`]    – Recursive mutex with owner tracking.
- [`queue`]    – Bounded message queues.
- [`thread`]   – Threads with per-thread event mailboxes and sleep services.
- [`event`]    – Event records and the mailbox dispatch contract.
- [`notify`]   – Coalescing one-shot notifications targeting a thread.
- [`fifo`]     – Single-producer/single-consumer byte ring.
- [`pipe`]     – Bounded byte stream with EOF and R/W callbacks.
- [`work`]     – Worker-thread-backed work queues.
- [`timer`]    – One-shot and relaxed timers backing the sleep services.
- [`time`]     – Timeouts, elapsed timers and tick conversion.

Blocking operations come in pairs: a forever-blocking form and a `try_` form
taking a [`time::Timeout`]. The non-blocking surface (`Timeout::Immediate`)
is the one restricted contexts may use.
"#]

pub mod config;
pub mod critical;
pub mod event;
pub mod fifo;
pub mod mutex;
pub mod notify;
pub mod pipe;
pub mod queue;
pub mod sema;
mod sync;
pub mod thread;
pub mod time;
pub mod timer;
pub mod work;

pub use event::{Callback, Event};
pub use fifo::Fifo;
pub use mutex::RecursiveMutex;
pub use notify::Notify;
pub use pipe::{Pipe, PipeError, PipeEvents};
pub use queue::MessageQueue;
pub use sema::Semaphore;
pub use thread::{OsiError, Thread};
pub use time::{ElapsedTimer, Timeout};
pub use timer::Timer;
pub use work::{Work, WorkQueue};

/// Halts on an unrecoverable inconsistency.
///
/// Fatal conditions (a guaranteed deadlock, a broken configuration) are not
/// recoverable; there is no unwinding a caller is expected to catch.
pub fn fatal(msg: &str) -> ! {
    log::error!("fatal: {msg}");
    panic!("{msg}");
}
