use std::error::Error;
use std::thread;

use super::unique_name;
use crate::{MessageQueue, QueueError};

const MESSAGE_COUNT: u32 = 20_000;

/// Message `id` carries its id followed by a length and fill byte derived from it,
/// so a torn or misordered record is detectable on its own.
fn message(id: u32) -> Vec<u8> {
    let fill = (id % 251) as u8;
    let mut bytes = id.to_le_bytes().to_vec();
    bytes.extend(std::iter::repeat(fill).take((id % 37) as usize));
    bytes
}

#[test]
fn producer_and_consumer_threads_keep_order() -> Result<(), Box<dyn Error>> {
    let name = unique_name();
    let mut producer = MessageQueue::create(256, &name)?;
    let mut consumer = MessageQueue::attach(256, &name)?;

    let writer_thread = thread::spawn(move || -> Result<u32, QueueError> {
        let mut retries = 0u32;
        for id in 0..MESSAGE_COUNT {
            let payload = message(id);
            loop {
                match producer.enqueue(&payload) {
                    Ok(()) => break,
                    Err(QueueError::CapacityExceeded { .. }) => {
                        retries += 1;
                        thread::yield_now();
                    }
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(retries)
    });

    let reader_thread = thread::spawn(move || -> Result<u32, QueueError> {
        let mut received = 0u32;
        while received < MESSAGE_COUNT {
            match consumer.dequeue()? {
                Some(payload) => {
                    assert_eq!(payload, message(received), "record {} is wrong", received);
                    received += 1;
                }
                None => thread::yield_now(),
            }
        }
        assert!(consumer.diagnostics()?.is_empty());
        Ok(received)
    });

    let retries = writer_thread.join().expect("writer thread panicked")?;
    let received = reader_thread.join().expect("reader thread panicked")?;
    println!("received {} messages, writer retried {} times", received, retries);
    assert_eq!(received, MESSAGE_COUNT);
    Ok(())
}
