//! Producer-Consumer example over a pipe and a work queue.
//!
//! A producer thread streams bytes into a pipe while the consumer drains
//! it with blocking reads; a work queue serialises per-chunk bookkeeping
//! the way a storage stack serialises flash traffic.

use std::time::Duration;

use osi::event::callback;
use osi::{Pipe, PipeError, Semaphore, Thread, Timeout, Work, WorkQueue};

fn main() {
    println!("=== Pipe producer-consumer example ===\n");

    let pipe = Pipe::new(32);
    let bookkeeping = WorkQueue::new("wq_example", 10, 64 * 1024).expect("create work queue");

    // Producer: write ten chunks, then signal end-of-stream.
    let producer_pipe = pipe.clone();
    let producer = Thread::spawn("producer", 10, 64 * 1024, 0, move || {
        for chunk in 0u8..10 {
            let payload = [chunk; 16];
            let sent = producer_pipe
                .write_all(&payload, Timeout::Forever)
                .expect("pipe closed under the producer");
            println!("Producer: chunk #{chunk} ({sent} bytes)");
        }
        producer_pipe.set_eof();
        println!("Producer: finished");
    })
    .expect("spawn producer");

    // Consumer: drain the pipe and log each chunk on the work queue.
    let chunks_logged = Semaphore::new(256, 0);
    let mut total = 0usize;
    let mut chunks = 0usize;
    let mut buf = [0u8; 16];
    loop {
        match pipe.read_all(&mut buf, Timeout::from_millis(500)) {
            Ok(0) => continue,
            Ok(n) => {
                total += n;
                chunks += 1;
                let first = buf[0];
                let done = chunks_logged.clone();
                Work::new(
                    callback(move || println!("Consumer: chunk #{first} ({n} bytes)")),
                    Some(callback(move || done.release())),
                )
                .enqueue(&bookkeeping);
            }
            Err(PipeError::EndOfStream) => break,
            Err(e) => panic!("consumer failed: {e}"),
        }
    }

    for _ in 0..chunks {
        assert!(chunks_logged.try_acquire(Timeout::Duration(Duration::from_secs(2))));
    }
    let _ = producer;
    bookkeeping.delete();

    println!("\nConsumed {total} bytes, end of stream reached");
}
