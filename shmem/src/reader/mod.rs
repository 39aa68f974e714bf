use std::sync::atomic::Ordering;

use tracing::trace;

use crate::errors::QueueError;
use crate::layout::{RingBuffer, RECORD_PREFIX_LEN, WRAP_MARKER};

/// Offset of the next record's prefix and the slack skipped to reach it.
///
/// Mirrors the writer: a tail too short for a prefix, or one holding the wrap
/// marker, means the record was placed at offset 0.
pub(crate) fn locate_record<F>(capacity: u32, read_cursor: u32, peek_prefix: F) -> (u32, u32)
where
    F: FnOnce(u32) -> u32,
{
    let tail = capacity - read_cursor;
    if (tail as usize) < RECORD_PREFIX_LEN || peek_prefix(read_cursor) == WRAP_MARKER {
        (0, tail)
    } else {
        (read_cursor, 0)
    }
}

/// Checks a length prefix against the published occupancy and the region end,
/// returning the record size.
pub(crate) fn check_record(
    capacity: u32,
    occupancy: u32,
    start: u32,
    slack: u32,
    length: u32,
) -> Result<u32, QueueError> {
    let record_size = RECORD_PREFIX_LEN as u64 + length as u64;
    let corrupt = length == WRAP_MARKER
        || slack as u64 + record_size > occupancy as u64
        || start as u64 + record_size > capacity as u64;
    if corrupt {
        return Err(QueueError::CorruptRecord {
            offset: start,
            length,
        });
    }
    Ok(record_size as u32)
}

impl RingBuffer {
    /// Removes the oldest record. Returns `Ok(None)` straight away when the
    /// queue is empty; this is a poll, never a wait.
    ///
    /// Only one process may dequeue at a time.
    pub fn dequeue(&self) -> Result<Option<Vec<u8>>, QueueError> {
        let header = self.header();
        // Pairs with the release in enqueue; every counted byte is in place.
        let occupancy = header.occupancy.load(Ordering::Acquire);
        if occupancy == 0 {
            return Ok(None);
        }
        let read_cursor = header.read_cursor.load(Ordering::Relaxed);
        let (start, slack) =
            locate_record(self.capacity(), read_cursor, |offset| self.read_prefix(offset));
        let length = self.read_prefix(start);
        let record_size = check_record(self.capacity(), occupancy, start, slack, length)?;

        let mut payload = vec![0u8; length as usize];
        self.read_bytes(start + RECORD_PREFIX_LEN as u32, &mut payload);

        let next_cursor = (start + record_size) % self.capacity();
        header.read_cursor.store(next_cursor, Ordering::Release);
        let previous = header
            .occupancy
            .fetch_sub(slack + record_size, Ordering::AcqRel);

        trace!(
            length,
            start,
            slack,
            read_cursor = next_cursor,
            occupancy = previous - slack - record_size,
            "dequeued record"
        );
        Ok(Some(payload))
    }
}
