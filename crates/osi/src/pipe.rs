//! Bounded byte stream between a producer and a consumer.
//!
//! A pipe carries bytes in writer order through a ring buffer with
//! monotonic counters (`wr - rd <= size` always holds). Single-shot
//! [`read`](Pipe::read)/[`write`](Pipe::write) never block; the `_all`
//! forms loop with a decaying timeout on the pipe's semaphores. Stopping is
//! terminal; EOF forbids writes but lets reads drain.
//!
//! Registered callbacks run on whichever thread triggered the transition,
//! outside the pipe lock. They must be short and non-blocking.

use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;
use thiserror::Error;

use crate::sema::Semaphore;
use crate::sync::Mutex;
use crate::time::{ElapsedTimer, Timeout};

bitflags! {
    /// Callback event mask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PipeEvents: u32 {
        /// New bytes were deposited for the reader.
        const RX_ARRIVED = 1 << 0;
        /// The reader drained everything the writer had deposited.
        const TX_COMPLETE = 1 << 1;
    }
}

/// Callback invoked on pipe transitions matching the registered mask.
pub type PipeCallback = Arc<dyn Fn(PipeEvents) + Send + Sync + 'static>;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PipeError {
    /// The pipe was stopped; all further reads and writes fail.
    #[error("pipe is stopped")]
    Stopped,
    /// EOF: the producer closed and the buffered bytes are drained.
    #[error("end of stream")]
    EndOfStream,
}

/// Thread-safe bounded byte stream.
pub struct Pipe {
    inner: Arc<PipeInner>,
}

struct PipeInner {
    size: usize,
    state: Mutex<PipeState>,
    /// Released when bytes arrive; readers wait here.
    rd_avail: Semaphore,
    /// Released when space frees up; writers wait here.
    wr_avail: Semaphore,
}

struct PipeState {
    buf: Box<[u8]>,
    rd: u64,
    wr: u64,
    running: bool,
    eof: bool,
    data_done: bool,
    rd_cb: Option<CallbackSlot>,
    wr_cb: Option<CallbackSlot>,
}

struct CallbackSlot {
    mask: PipeEvents,
    cb: PipeCallback,
}

impl CallbackSlot {
    fn armed_for(&self, event: PipeEvents) -> Option<PipeCallback> {
        self.mask.contains(event).then(|| Arc::clone(&self.cb))
    }
}

impl Pipe {
    /// Creates a pipe with a buffer of `size` bytes.
    ///
    /// # Panics
    ///
    /// Panics if `size` is zero.
    pub fn new(size: usize) -> Self {
        assert!(size > 0, "pipe size must be non-zero");
        Self {
            inner: Arc::new(PipeInner {
                size,
                state: Mutex::new(PipeState {
                    buf: vec![0; size].into_boxed_slice(),
                    rd: 0,
                    wr: 0,
                    running: true,
                    eof: false,
                    data_done: false,
                    rd_cb: None,
                    wr_cb: None,
                }),
                rd_avail: Semaphore::binary(false),
                wr_avail: Semaphore::binary(true),
            }),
        }
    }

    /// Reads up to `buf.len()` bytes without blocking.
    ///
    /// Returns `Ok(0)` when the pipe is merely empty. Once the producer is
    /// done (EOF or the data-done marker) and the buffer is drained, the
    /// pipe reports [`PipeError::EndOfStream`].
    pub fn read(&self, buf: &mut [u8]) -> Result<usize, PipeError> {
        if buf.is_empty() {
            return Ok(0);
        }

        let (len, writer_cb) = {
            let mut state = self.inner.state.lock();
            if !state.running {
                return Err(PipeError::Stopped);
            }

            let bytes = (state.wr - state.rd) as usize;
            if bytes == 0 {
                if state.eof || state.data_done {
                    state.eof = true;
                    drop(state);
                    // Unblock both sides; the stream is over.
                    self.inner.rd_avail.release();
                    self.inner.wr_avail.release();
                    return Err(PipeError::EndOfStream);
                }
                return Ok(0);
            }

            let len = buf.len().min(bytes);
            let offset = (state.rd % self.inner.size as u64) as usize;
            let tail = self.inner.size - offset;
            if tail >= len {
                buf[..len].copy_from_slice(&state.buf[offset..offset + len]);
            } else {
                buf[..tail].copy_from_slice(&state.buf[offset..]);
                buf[tail..len].copy_from_slice(&state.buf[..len - tail]);
            }
            state.rd += len as u64;

            // Drained everything the writer had deposited.
            let writer_cb = if len == bytes {
                state
                    .wr_cb
                    .as_ref()
                    .and_then(|slot| slot.armed_for(PipeEvents::TX_COMPLETE))
            } else {
                None
            };
            (len, writer_cb)
        };

        if let Some(cb) = writer_cb {
            cb(PipeEvents::TX_COMPLETE);
        }
        self.inner.wr_avail.release();
        Ok(len)
    }

    /// Writes up to `buf.len()` bytes without blocking.
    ///
    /// Returns `Ok(0)` when the buffer is full. Fails once the pipe is
    /// stopped or EOF was set.
    pub fn write(&self, buf: &[u8]) -> Result<usize, PipeError> {
        if buf.is_empty() {
            return Ok(0);
        }

        let (len, reader_cb) = {
            let mut state = self.inner.state.lock();
            if !state.running {
                return Err(PipeError::Stopped);
            }
            if state.eof {
                return Err(PipeError::EndOfStream);
            }

            let space = self.inner.size - (state.wr - state.rd) as usize;
            let len = buf.len().min(space);
            if len == 0 {
                return Ok(0);
            }

            let offset = (state.wr % self.inner.size as u64) as usize;
            let tail = self.inner.size - offset;
            if tail >= len {
                state.buf[offset..offset + len].copy_from_slice(&buf[..len]);
            } else {
                let (head, rest) = buf[..len].split_at(tail);
                state.buf[offset..].copy_from_slice(head);
                state.buf[..len - tail].copy_from_slice(rest);
            }
            state.wr += len as u64;

            let reader_cb = state
                .rd_cb
                .as_ref()
                .and_then(|slot| slot.armed_for(PipeEvents::RX_ARRIVED));
            (len, reader_cb)
        };

        if let Some(cb) = reader_cb {
            cb(PipeEvents::RX_ARRIVED);
        }
        self.inner.rd_avail.release();
        Ok(len)
    }

    /// Reads until `buf` is full, the timeout decays to zero, EOF is
    /// reached, or an error occurs. Returns the bytes read so far on
    /// timeout or EOF.
    pub fn read_all(&self, buf: &mut [u8], timeout: Timeout) -> Result<usize, PipeError> {
        if buf.is_empty() {
            return Ok(0);
        }

        let timer = ElapsedTimer::start();
        let mut done = 0;
        loop {
            done += self.read(&mut buf[done..])?;
            if done == buf.len() || timeout == Timeout::Immediate || self.is_eof() {
                return Ok(done);
            }

            match timeout.remaining(timer.elapsed()) {
                None => return Ok(done),
                Some(Timeout::Forever) => self.inner.rd_avail.acquire(),
                Some(rem) => {
                    if !self.inner.rd_avail.try_acquire(rem) {
                        return Ok(done);
                    }
                }
            }
        }
    }

    /// Writes until `buf` is consumed, the timeout decays to zero, or an
    /// error occurs. Returns the bytes written so far on timeout.
    pub fn write_all(&self, buf: &[u8], timeout: Timeout) -> Result<usize, PipeError> {
        if buf.is_empty() {
            return Ok(0);
        }

        let timer = ElapsedTimer::start();
        let mut done = 0;
        loop {
            done += self.write(&buf[done..])?;
            if done == buf.len() || timeout == Timeout::Immediate {
                return Ok(done);
            }

            match timeout.remaining(timer.elapsed()) {
                None => return Ok(done),
                Some(Timeout::Forever) => self.inner.wr_avail.acquire(),
                Some(rem) => {
                    if !self.inner.wr_avail.try_acquire(rem) {
                        return Ok(done);
                    }
                }
            }
        }
    }

    /// Waits until bytes are readable. False when stopped, at EOF with an
    /// empty buffer, or on timeout.
    pub fn wait_read_avail(&self, timeout: Timeout) -> bool {
        let timer = ElapsedTimer::start();
        loop {
            if self.is_stopped() {
                return false;
            }
            if self.read_avail() > 0 {
                return true;
            }
            if self.is_eof() {
                return false;
            }

            match timeout.remaining(timer.elapsed()) {
                None => return false,
                Some(Timeout::Forever) => self.inner.rd_avail.acquire(),
                Some(rem) => {
                    if !self.inner.rd_avail.try_acquire(rem) {
                        return false;
                    }
                }
            }
        }
    }

    /// Waits until space is writable. False when stopped or on timeout.
    pub fn wait_write_avail(&self, timeout: Timeout) -> bool {
        let timer = ElapsedTimer::start();
        loop {
            if self.is_stopped() {
                return false;
            }
            if self.write_avail() > 0 {
                return true;
            }

            match timeout.remaining(timer.elapsed()) {
                None => return false,
                Some(Timeout::Forever) => self.inner.wr_avail.acquire(),
                Some(rem) => {
                    if !self.inner.wr_avail.try_acquire(rem) {
                        return false;
                    }
                }
            }
        }
    }

    /// Stops the pipe. Terminal: all further reads and writes fail, and
    /// blocked waiters are released.
    pub fn stop(&self) {
        self.inner.state.lock().running = false;
        self.inner.rd_avail.release();
        self.inner.wr_avail.release();
    }

    pub fn is_stopped(&self) -> bool {
        !self.inner.state.lock().running
    }

    /// Marks end-of-stream: writes fail from now on, reads drain what is
    /// buffered. Blocked waiters are released.
    pub fn set_eof(&self) {
        self.inner.state.lock().eof = true;
        self.inner.rd_avail.release();
        self.inner.wr_avail.release();
    }

    pub fn is_eof(&self) -> bool {
        self.inner.state.lock().eof
    }

    /// Producer-complete marker: the next read that finds the buffer empty
    /// transitions the pipe to EOF.
    pub fn finish_data(&self) {
        self.inner.state.lock().data_done = true;
    }

    /// Returns the pipe to its initial running state with empty counters.
    pub fn reset(&self) {
        let mut state = self.inner.state.lock();
        state.rd = 0;
        state.wr = 0;
        state.running = true;
        state.eof = false;
    }

    /// Bytes available to read.
    pub fn read_avail(&self) -> usize {
        let state = self.inner.state.lock();
        (state.wr - state.rd) as usize
    }

    /// Space available to write.
    pub fn write_avail(&self) -> usize {
        let state = self.inner.state.lock();
        self.inner.size - (state.wr - state.rd) as usize
    }

    /// Registers the reader-side callback with its event mask.
    pub fn set_reader_callback(
        &self,
        mask: PipeEvents,
        cb: impl Fn(PipeEvents) + Send + Sync + 'static,
    ) {
        self.inner.state.lock().rd_cb = Some(CallbackSlot {
            mask,
            cb: Arc::new(cb),
        });
    }

    pub fn clear_reader_callback(&self) {
        self.inner.state.lock().rd_cb = None;
    }

    /// Registers the writer-side callback with its event mask.
    pub fn set_writer_callback(
        &self,
        mask: PipeEvents,
        cb: impl Fn(PipeEvents) + Send + Sync + 'static,
    ) {
        self.inner.state.lock().wr_cb = Some(CallbackSlot {
            mask,
            cb: Arc::new(cb),
        });
    }

    pub fn clear_writer_callback(&self) {
        self.inner.state.lock().wr_cb = None;
    }
}

impl Clone for Pipe {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl fmt::Debug for Pipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Pipe")
            .field("size", &self.inner.size)
            .field("rd", &state.rd)
            .field("wr", &state.wr)
            .field("running", &state.running)
            .field("eof", &state.eof)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn short_read_and_write() {
        let pipe = Pipe::new(16);
        assert_eq!(pipe.write(b"hello"), Ok(5));
        assert_eq!(pipe.read_avail(), 5);
        assert_eq!(pipe.write_avail(), 11);

        let mut buf = [0u8; 16];
        assert_eq!(pipe.read(&mut buf), Ok(5));
        assert_eq!(&buf[..5], b"hello");
        assert_eq!(pipe.read(&mut buf), Ok(0));
    }

    #[test]
    fn wrap_around_preserves_bytes() {
        let pipe = Pipe::new(8);
        let mut buf = [0u8; 8];

        assert_eq!(pipe.write(b"abcdef"), Ok(6));
        assert_eq!(pipe.read(&mut buf[..6]), Ok(6));
        assert_eq!(&buf[..6], b"abcdef");

        // Crosses the wrap point.
        assert_eq!(pipe.write(b"ghijkl"), Ok(6));
        assert_eq!(pipe.read(&mut buf[..6]), Ok(6));
        assert_eq!(&buf[..6], b"ghijkl");
    }

    #[test]
    fn write_truncates_to_space() {
        let pipe = Pipe::new(4);
        assert_eq!(pipe.write(b"abcdef"), Ok(4));
        assert_eq!(pipe.write(b"gh"), Ok(0));
    }

    #[test]
    fn eof_drains_then_fails() {
        let pipe = Pipe::new(16);
        assert_eq!(pipe.write(&[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]), Ok(10));

        let mut buf = [0u8; 6];
        assert_eq!(pipe.read(&mut buf), Ok(6));
        assert_eq!(&buf, &[0, 1, 2, 3, 4, 5]);

        pipe.set_eof();
        assert_eq!(pipe.read(&mut buf), Ok(4));
        assert_eq!(&buf[..4], &[6, 7, 8, 9]);
        assert_eq!(pipe.read(&mut buf[..1]), Err(PipeError::EndOfStream));
        // Writes fail outright after EOF.
        assert_eq!(pipe.write(b"x"), Err(PipeError::EndOfStream));
    }

    #[test]
    fn stop_is_terminal() {
        let pipe = Pipe::new(8);
        pipe.write(b"ab").unwrap();
        pipe.stop();
        let mut buf = [0u8; 2];
        assert_eq!(pipe.read(&mut buf), Err(PipeError::Stopped));
        assert_eq!(pipe.write(b"c"), Err(PipeError::Stopped));
        assert!(pipe.is_stopped());
    }

    #[test]
    fn reset_restores_running() {
        let pipe = Pipe::new(8);
        pipe.write(b"abc").unwrap();
        pipe.stop();
        pipe.reset();
        assert!(!pipe.is_stopped());
        assert!(!pipe.is_eof());
        assert_eq!(pipe.read_avail(), 0);
        assert_eq!(pipe.write(b"xy"), Ok(2));
    }

    #[test]
    fn data_done_turns_empty_read_into_eof() {
        let pipe = Pipe::new(8);
        pipe.write(b"ab").unwrap();
        pipe.finish_data();

        let mut buf = [0u8; 4];
        assert_eq!(pipe.read(&mut buf), Ok(2));
        assert_eq!(pipe.read(&mut buf), Err(PipeError::EndOfStream));
        assert!(pipe.is_eof());
    }

    #[test]
    fn reader_callback_fires_on_arrival() {
        let pipe = Pipe::new(8);
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = Arc::clone(&hits);
        pipe.set_reader_callback(PipeEvents::RX_ARRIVED, move |event| {
            assert_eq!(event, PipeEvents::RX_ARRIVED);
            hits2.fetch_add(1, Ordering::SeqCst);
        });

        pipe.write(b"a").unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        // Masked-out events do not fire.
        pipe.clear_reader_callback();
        let hits3 = Arc::clone(&hits);
        pipe.set_reader_callback(PipeEvents::TX_COMPLETE, move |_| {
            hits3.fetch_add(1, Ordering::SeqCst);
        });
        pipe.write(b"b").unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn writer_callback_fires_on_full_drain() {
        let pipe = Pipe::new(8);
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = Arc::clone(&hits);
        pipe.set_writer_callback(PipeEvents::TX_COMPLETE, move |_| {
            hits2.fetch_add(1, Ordering::SeqCst);
        });

        pipe.write(b"abcd").unwrap();
        let mut buf = [0u8; 2];
        // Partial drain: no completion.
        pipe.read(&mut buf).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        // Full drain: completion fires.
        pipe.read(&mut buf).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn read_all_returns_partial_on_timeout() {
        let pipe = Pipe::new(8);
        pipe.write(b"abc").unwrap();
        let mut buf = [0u8; 8];
        let got = pipe
            .read_all(&mut buf, Timeout::from_millis(20))
            .unwrap();
        assert_eq!(got, 3);
        assert_eq!(&buf[..3], b"abc");
    }

    #[test]
    fn write_all_blocks_until_reader_drains() {
        let pipe = Pipe::new(4);
        let reader = pipe.clone();
        let drained = std::thread::spawn(move || {
            let mut out = Vec::new();
            let mut buf = [0u8; 4];
            while out.len() < 8 {
                match reader.read_all(&mut buf, Timeout::from_millis(500)) {
                    Ok(0) => std::thread::yield_now(),
                    Ok(n) => out.extend_from_slice(&buf[..n]),
                    Err(_) => break,
                }
            }
            out
        });

        assert_eq!(pipe.write_all(b"abcdefgh", Timeout::Forever), Ok(8));
        assert_eq!(drained.join().unwrap(), b"abcdefgh");
    }
}
