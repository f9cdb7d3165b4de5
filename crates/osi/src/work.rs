//! Work items and worker-thread-backed work queues.
//!
//! A [`Work`] item pairs a `run` callback with an optional `complete` hook.
//! It belongs to at most one queue at a time; enqueueing it elsewhere
//! detaches it first. Each [`WorkQueue`] owns a single worker thread that
//! consumes its list strictly in insertion order.
//!
//! Lock order inside this module is always item state before queue state.

use std::collections::VecDeque;
use std::sync::{Arc, OnceLock};

use crate::config;
use crate::event::Callback;
use crate::sema::Semaphore;
use crate::sync::Mutex;
use crate::thread::{OsiError, Thread};
use crate::time::{ElapsedTimer, Timeout};

/// Schedulable run+complete callback pair.
#[derive(Clone)]
pub struct Work {
    inner: Arc<WorkInner>,
}

struct WorkInner {
    state: Mutex<WorkState>,
}

struct WorkState {
    run: Callback,
    complete: Option<Callback>,
    queue: Option<WorkQueue>,
}

impl Work {
    /// Creates a detached work item.
    pub fn new(run: Callback, complete: Option<Callback>) -> Self {
        Self {
            inner: Arc::new(WorkInner {
                state: Mutex::new(WorkState {
                    run,
                    complete,
                    queue: None,
                }),
            }),
        }
    }

    /// Replaces the callbacks of an existing item.
    pub fn reset_callback(&self, run: Callback, complete: Option<Callback>) {
        let mut state = self.inner.state.lock();
        state.run = run;
        state.complete = complete;
    }

    /// Appends the item to `wq`. An item already on another queue is moved;
    /// an item already on `wq` stays where it is.
    pub fn enqueue(&self, wq: &WorkQueue) -> bool {
        let mut state = self.inner.state.lock();
        if let Some(current) = &state.queue {
            if current == wq {
                return true;
            }
            let current = current.clone();
            let mut queue_state = current.inner.state.lock();
            remove_item(&mut queue_state.list, self);
        }
        wq.inner.state.lock().list.push_back(self.clone());
        state.queue = Some(wq.clone());
        drop(state);
        wq.inner.work_sema.release();
        true
    }

    /// Appends the item to the tail of `wq` unconditionally; an item
    /// already on `wq` is moved behind the items queued after it.
    pub fn enqueue_last(&self, wq: &WorkQueue) -> bool {
        let mut state = self.inner.state.lock();
        if let Some(current) = state.queue.take() {
            let mut queue_state = current.inner.state.lock();
            remove_item(&mut queue_state.list, self);
        }
        wq.inner.state.lock().list.push_back(self.clone());
        state.queue = Some(wq.clone());
        drop(state);
        wq.inner.work_sema.release();
        true
    }

    /// Detaches the item if it is still enqueued. An item the worker has
    /// already taken cannot be cancelled mid-callback.
    pub fn cancel(&self) {
        let mut state = self.inner.state.lock();
        if let Some(queue) = state.queue.take() {
            let mut queue_state = queue.inner.state.lock();
            remove_item(&mut queue_state.list, self);
        }
    }

    /// Waits until the item is no longer enqueued.
    ///
    /// The finish signal is shared by every item on the queue, so each
    /// wakeup re-checks this item's membership; wakeups for other items
    /// are absorbed by the loop.
    pub fn wait_finish(&self, timeout: Timeout) -> bool {
        let timer = ElapsedTimer::start();
        loop {
            let queue = match &self.inner.state.lock().queue {
                None => return true,
                Some(queue) => queue.clone(),
            };

            match timeout.remaining(timer.elapsed()) {
                None => return false,
                Some(Timeout::Forever) => queue.inner.finish_sema.acquire(),
                Some(rem) => {
                    if !queue.inner.finish_sema.try_acquire(rem) {
                        return false;
                    }
                }
            }
        }
    }

    /// Whether the item currently sits on a queue.
    pub fn is_enqueued(&self) -> bool {
        self.inner.state.lock().queue.is_some()
    }
}

impl PartialEq for Work {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Work {}

fn remove_item(list: &mut VecDeque<Work>, item: &Work) {
    list.retain(|w| !Arc::ptr_eq(&w.inner, &item.inner));
}

/// Work queue backed by one worker thread.
#[derive(Clone)]
pub struct WorkQueue {
    inner: Arc<WqInner>,
}

impl std::fmt::Debug for WorkQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkQueue")
            .field("name", &self.inner.name)
            .finish()
    }
}

struct WqInner {
    name: String,
    state: Mutex<WqState>,
    work_sema: Semaphore,
    finish_sema: Semaphore,
}

struct WqState {
    running: bool,
    list: VecDeque<Work>,
}

impl WorkQueue {
    /// Creates a queue and spawns its worker thread.
    pub fn new(name: &str, priority: u32, stack_size: usize) -> Result<Self, OsiError> {
        let inner = Arc::new(WqInner {
            name: name.to_owned(),
            state: Mutex::new(WqState {
                running: true,
                list: VecDeque::new(),
            }),
            work_sema: Semaphore::binary(true),
            finish_sema: Semaphore::binary(false),
        });

        let worker = Arc::clone(&inner);
        Thread::spawn(name, priority, stack_size, 0, move || worker_loop(worker))?;
        log::debug!("work queue {name} started");
        Ok(Self { inner })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Stops the queue. The worker drains the remaining items (detaching
    /// them without running) and exits.
    pub fn delete(&self) {
        self.inner.state.lock().running = false;
        self.inner.work_sema.release();
    }
}

impl PartialEq for WorkQueue {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for WorkQueue {}

fn worker_loop(wq: Arc<WqInner>) {
    loop {
        if !wq.state.lock().running {
            break;
        }

        let head = wq.state.lock().list.front().cloned();
        let Some(work) = head else {
            wq.work_sema.acquire();
            continue;
        };

        // Re-validate under both locks: the item may have been cancelled or
        // moved between the peek and here.
        let captured = {
            let mut item_state = work.inner.state.lock();
            let mut queue_state = wq.state.lock();
            let still_head = queue_state
                .list
                .front()
                .is_some_and(|w| *w == work);
            let owned_here = item_state
                .queue
                .as_ref()
                .is_some_and(|q| Arc::ptr_eq(&q.inner, &wq));
            if still_head && owned_here {
                queue_state.list.pop_front();
                item_state.queue = None;
                Some((item_state.run.clone(), item_state.complete.clone()))
            } else {
                None
            }
        };

        let Some((run, complete)) = captured else {
            continue;
        };
        run();
        if let Some(complete) = complete {
            complete();
        }
        wq.finish_sema.release();
    }

    // Shutdown: detach whatever is still queued without running it.
    let leftovers: Vec<Work> = {
        let mut queue_state = wq.state.lock();
        queue_state.list.drain(..).collect()
    };
    for work in leftovers {
        let mut item_state = work.inner.state.lock();
        if item_state
            .queue
            .as_ref()
            .is_some_and(|q| Arc::ptr_eq(&q.inner, &wq))
        {
            item_state.queue = None;
        }
    }
    log::debug!("work queue {} stopped", wq.name);
}

struct SystemQueues {
    high: WorkQueue,
    low: WorkQueue,
    file: WorkQueue,
}

static SYSTEM: OnceLock<SystemQueues> = OnceLock::new();

/// Creates the three process-wide work queues. Idempotent.
pub fn init_system_work_queues() {
    SYSTEM.get_or_init(|| SystemQueues {
        high: WorkQueue::new(
            "wq_hi",
            config::PRIORITY_HIGH,
            config::HIGH_PRIO_WQ_STACK_SIZE,
        )
        .expect("failed to create high-priority work queue"),
        low: WorkQueue::new("wq_lo", config::PRIORITY_LOW, config::LOW_PRIO_WQ_STACK_SIZE)
            .expect("failed to create low-priority work queue"),
        file: WorkQueue::new(
            "wq_fs",
            config::PRIORITY_BELOW_NORMAL,
            config::FILE_WRITE_WQ_STACK_SIZE,
        )
        .expect("failed to create file-write work queue"),
    });
}

fn system() -> &'static SystemQueues {
    SYSTEM.get().expect("system work queues not initialised")
}

/// The high-priority system work queue.
pub fn high_priority() -> WorkQueue {
    system().high.clone()
}

/// The low-priority system work queue.
pub fn low_priority() -> WorkQueue {
    system().low.clone()
}

/// The file-write system work queue; flash traffic is typically serialised
/// by enqueueing every operation here.
pub fn file_write() -> WorkQueue {
    system().file.clone()
}
