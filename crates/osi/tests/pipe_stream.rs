//! Integration tests for pipes driven from real producer/consumer threads.

use std::time::Duration;

use osi::{Pipe, PipeError, Timeout};

#[test]
fn drain_and_eof_sequence() {
    let pipe = Pipe::new(16);
    let payload: Vec<u8> = (0..10).collect();
    assert_eq!(pipe.write(&payload), Ok(10));

    let mut buf = [0u8; 6];
    assert_eq!(pipe.read(&mut buf), Ok(6));
    assert_eq!(&buf, &[0, 1, 2, 3, 4, 5]);

    pipe.set_eof();
    assert_eq!(pipe.read(&mut buf), Ok(4));
    assert_eq!(&buf[..4], &[6, 7, 8, 9]);
    assert_eq!(pipe.read(&mut buf[..1]), Err(PipeError::EndOfStream));
}

#[test]
fn counters_stay_bounded_across_interleavings() {
    let pipe = Pipe::new(32);
    let writer_pipe = pipe.clone();

    let writer = std::thread::spawn(move || {
        let data: Vec<u8> = (0..=255).collect();
        let mut sent = 0;
        while sent < data.len() {
            match writer_pipe.write_all(&data[sent..], Timeout::from_millis(200)) {
                Ok(n) => sent += n,
                Err(e) => panic!("writer failed: {e}"),
            }
        }
        writer_pipe.set_eof();
    });

    let mut received = Vec::new();
    let mut buf = [0u8; 7];
    loop {
        // 0 <= wr - rd <= size at every observation point. The writer may
        // deposit between the two observations, so only the per-counter
        // bounds are stable.
        assert!(pipe.read_avail() <= 32);
        assert!(pipe.write_avail() <= 32);

        match pipe.read_all(&mut buf, Timeout::from_millis(200)) {
            Ok(n) => received.extend_from_slice(&buf[..n]),
            Err(PipeError::EndOfStream) => break,
            Err(e) => panic!("reader failed: {e}"),
        }
    }
    writer.join().unwrap();

    let expected: Vec<u8> = (0..=255).collect();
    assert_eq!(received, expected);
}

#[test]
fn stop_releases_blocked_reader() {
    let pipe = Pipe::new(8);
    let reader_pipe = pipe.clone();

    let reader = std::thread::spawn(move || reader_pipe.wait_read_avail(Timeout::Forever));

    std::thread::sleep(Duration::from_millis(20));
    pipe.stop();
    assert!(!reader.join().unwrap());
}

#[test]
fn wait_write_avail_sees_reader_progress() {
    let pipe = Pipe::new(4);
    pipe.write(b"abcd").unwrap();
    assert!(!pipe.wait_write_avail(Timeout::from_millis(20)));

    let writer_pipe = pipe.clone();
    let waiter = std::thread::spawn(move || writer_pipe.wait_write_avail(Timeout::Forever));

    std::thread::sleep(Duration::from_millis(20));
    let mut buf = [0u8; 2];
    pipe.read(&mut buf).unwrap();
    assert!(waiter.join().unwrap());
}
