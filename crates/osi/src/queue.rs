//! Bounded message queues.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use crate::sync::{Condvar, Mutex};
use crate::time::Timeout;

/// Bounded FIFO queue of fixed-capacity, declared at creation.
///
/// `put`/`get` block forever; the `try_` forms take a [`Timeout`], whose
/// `Immediate` case is the surface restricted contexts may use.
pub struct MessageQueue<T> {
    inner: Arc<QueueInner<T>>,
}

struct QueueInner<T> {
    capacity: usize,
    items: Mutex<VecDeque<T>>,
    not_empty: Condvar,
    not_full: Condvar,
}

impl<T> MessageQueue<T> {
    /// Creates a queue holding at most `capacity` elements.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "message queue capacity must be non-zero");
        Self {
            inner: Arc::new(QueueInner {
                capacity,
                items: Mutex::new(VecDeque::with_capacity(capacity)),
                not_empty: Condvar::new(),
                not_full: Condvar::new(),
            }),
        }
    }

    /// Appends `value`, blocking while the queue is full.
    pub fn put(&self, value: T) {
        let mut items = self.inner.items.lock();
        while items.len() >= self.inner.capacity {
            items = self.inner.not_full.wait(items);
        }
        items.push_back(value);
        drop(items);
        self.inner.not_empty.notify_one();
    }

    /// Appends `value` with a bound; gives the value back on timeout.
    pub fn try_put(&self, value: T, timeout: Timeout) -> Result<(), T> {
        let mut items = self.inner.items.lock();
        if items.len() >= self.inner.capacity {
            match timeout {
                Timeout::Immediate => return Err(value),
                Timeout::Forever => {
                    while items.len() >= self.inner.capacity {
                        items = self.inner.not_full.wait(items);
                    }
                }
                Timeout::Duration(d) => {
                    let deadline = Instant::now() + d;
                    while items.len() >= self.inner.capacity {
                        let now = Instant::now();
                        if now >= deadline {
                            return Err(value);
                        }
                        let (guard, _) = self.inner.not_full.wait_timeout(items, deadline - now);
                        items = guard;
                    }
                }
            }
        }
        items.push_back(value);
        drop(items);
        self.inner.not_empty.notify_one();
        Ok(())
    }

    /// Removes the front element, blocking while the queue is empty.
    pub fn get(&self) -> T {
        let mut items = self.inner.items.lock();
        loop {
            if let Some(value) = items.pop_front() {
                drop(items);
                self.inner.not_full.notify_one();
                return value;
            }
            items = self.inner.not_empty.wait(items);
        }
    }

    /// Removes the front element with a bound; `None` on timeout.
    pub fn try_get(&self, timeout: Timeout) -> Option<T> {
        let mut items = self.inner.items.lock();
        if items.is_empty() {
            match timeout {
                Timeout::Immediate => return None,
                Timeout::Forever => {
                    while items.is_empty() {
                        items = self.inner.not_empty.wait(items);
                    }
                }
                Timeout::Duration(d) => {
                    let deadline = Instant::now() + d;
                    while items.is_empty() {
                        let now = Instant::now();
                        if now >= deadline {
                            return None;
                        }
                        let (guard, _) = self.inner.not_empty.wait_timeout(items, deadline - now);
                        items = guard;
                    }
                }
            }
        }
        let value = items.pop_front();
        drop(items);
        self.inner.not_full.notify_one();
        value
    }

    /// Number of queued elements.
    pub fn pending(&self) -> usize {
        self.inner.items.lock().len()
    }

    /// Remaining free slots.
    pub fn space(&self) -> usize {
        self.inner.capacity - self.inner.items.lock().len()
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }
}

impl<T> Clone for MessageQueue<T> {
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
    fn fifo_order() {
        let queue = MessageQueue::new(4);
        queue.put("first");
        queue.put("second");
        queue.put("third");
        assert_eq!(queue.get(), "first");
        assert_eq!(queue.get(), "second");
        assert_eq!(queue.get(), "third");
    }

    #[test]
    fn try_put_full_returns_value() {
        let queue = MessageQueue::new(1);
        assert!(queue.try_put(1u32, Timeout::Immediate).is_ok());
        assert_eq!(queue.try_put(2u32, Timeout::Immediate), Err(2));
        assert_eq!(queue.pending(), 1);
        assert_eq!(queue.space(), 0);
    }

    #[test]
    fn try_get_times_out() {
        let queue: MessageQueue<u8> = MessageQueue::new(1);
        assert_eq!(queue.try_get(Timeout::Immediate), None);
        assert_eq!(
            queue.try_get(Timeout::Duration(Duration::from_millis(10))),
            None
        );
    }

    #[test]
    fn blocked_producer_resumes() {
        let queue = MessageQueue::new(1);
        queue.put(1u32);

        let q2 = queue.clone();
        let producer = std::thread::spawn(move || q2.put(2u32));

        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(queue.get(), 1);
        producer.join().unwrap();
        assert_eq!(queue.get(), 2);
    }
}
