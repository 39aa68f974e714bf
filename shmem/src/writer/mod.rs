use std::sync::atomic::Ordering;

use tracing::trace;

use crate::errors::QueueError;
use crate::layout::{RingBuffer, RECORD_PREFIX_LEN, WRAP_MARKER};

/// Where a record will land in the circular region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Placement {
    /// Physical offset of the length prefix.
    pub start: u32,
    /// Tail bytes abandoned to reach `start`. Zero unless the record wraps.
    pub slack: u32,
}

/// Decides whether a record of `record_size` bytes is written in place, wraps
/// to offset 0, or is rejected. Pure function of the writer's view of the header.
pub(crate) fn plan_write(
    capacity: u32,
    write_cursor: u32,
    occupancy: u32,
    record_size: usize,
) -> Result<Placement, QueueError> {
    let capacity = capacity as usize;
    let occupancy = occupancy as usize;
    let available = capacity - occupancy;
    if record_size > capacity {
        return Err(QueueError::CapacityExceeded {
            required: record_size,
            available,
        });
    }

    let tail = capacity - write_cursor as usize;
    let (start, slack) = if record_size <= tail {
        (write_cursor as usize, 0)
    } else {
        (0, tail)
    };
    if slack + record_size > available {
        return Err(QueueError::CapacityExceeded {
            required: slack + record_size,
            available,
        });
    }
    Ok(Placement {
        start: start as u32,
        slack: slack as u32,
    })
}

impl RingBuffer {
    /// Appends one record. Never blocks; a full queue is reported as
    /// `CapacityExceeded` and leaves every byte of the region untouched.
    ///
    /// Only one process may enqueue at a time.
    pub fn enqueue(&self, payload: &[u8]) -> Result<(), QueueError> {
        if payload.is_empty() {
            return Err(QueueError::InvalidArgument);
        }
        let record_size = RECORD_PREFIX_LEN + payload.len();
        let header = self.header();
        let write_cursor = header.write_cursor.load(Ordering::Relaxed);
        // Pairs with the release in dequeue; freed bytes are no longer being read.
        let occupancy = header.occupancy.load(Ordering::Acquire);
        let placement = plan_write(self.capacity(), write_cursor, occupancy, record_size)?;

        if placement.slack as usize >= RECORD_PREFIX_LEN {
            self.write_bytes(write_cursor, &WRAP_MARKER.to_le_bytes());
        }
        self.write_bytes(placement.start, &(payload.len() as u32).to_le_bytes());
        self.write_bytes(placement.start + RECORD_PREFIX_LEN as u32, payload);

        let record_size = record_size as u32;
        let next_cursor = (placement.start + record_size) % self.capacity();
        header.write_cursor.store(next_cursor, Ordering::Release);
        let previous = header
            .occupancy
            .fetch_add(placement.slack + record_size, Ordering::AcqRel);

        trace!(
            length = payload.len(),
            start = placement.start,
            slack = placement.slack,
            write_cursor = next_cursor,
            occupancy = previous + placement.slack + record_size,
            "enqueued record"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::HeapRing;

    #[test]
    fn plan_in_place() {
        let placement = plan_write(24, 0, 0, 8).unwrap();
        assert_eq!(placement, Placement { start: 0, slack: 0 });

        let placement = plan_write(24, 16, 16, 8).unwrap();
        assert_eq!(placement, Placement { start: 16, slack: 0 });
    }

    #[test]
    fn plan_exact_fill() {
        let placement = plan_write(16, 0, 0, 16).unwrap();
        assert_eq!(placement, Placement { start: 0, slack: 0 });
    }

    #[test]
    fn plan_wraps_with_slack() {
        // 24 of 30 bytes written and consumed, 6 tail bytes left.
        let placement = plan_write(30, 24, 0, 10).unwrap();
        assert_eq!(placement, Placement { start: 0, slack: 6 });
    }

    #[test]
    fn plan_rejects_oversized_on_empty_queue() {
        let err = plan_write(16, 0, 0, 17).unwrap_err();
        assert!(matches!(
            err,
            QueueError::CapacityExceeded {
                required: 17,
                available: 16
            }
        ));
    }

    #[test]
    fn plan_rejects_when_free_space_is_short() {
        let err = plan_write(24, 16, 16, 9).unwrap_err();
        assert!(matches!(
            err,
            QueueError::CapacityExceeded {
                required: 9,
                available: 8
            }
        ));
    }

    #[test]
    fn plan_counts_slack_against_free_space() {
        // Reader sits at 12 with 8 bytes queued at 12..20; 10 tail bytes remain.
        // Free space is 20..30 plus 0..12, so a 12 byte record wraps and fits.
        let placement = plan_write(30, 20, 8, 12).unwrap();
        assert_eq!(placement, Placement { start: 0, slack: 10 });

        // A 13 byte record would overwrite the unread record at 12.
        let err = plan_write(30, 20, 8, 13).unwrap_err();
        assert!(matches!(
            err,
            QueueError::CapacityExceeded {
                required: 23,
                available: 22
            }
        ));
    }

    #[test]
    fn plan_rejects_overrun_into_unread_bytes() {
        // Writer already wrapped: unread bytes at 20..30 and 0..4, free 4..20.
        // The tail from 4 holds the record, so no wrap is needed.
        let placement = plan_write(30, 4, 14, 16).unwrap();
        assert_eq!(placement, Placement { start: 4, slack: 0 });
        // But 17 bytes would reach unread data at 20.
        assert!(plan_write(30, 4, 14, 17).is_err());
    }

    #[test]
    fn enqueue_rejects_empty_payload() {
        let heap = HeapRing::new(24);
        let before = heap.ring.diagnostics();
        assert!(matches!(
            heap.ring.enqueue(&[]),
            Err(QueueError::InvalidArgument)
        ));
        assert_eq!(heap.ring.diagnostics(), before);
    }

    #[test]
    fn enqueue_writes_prefix_and_payload() {
        let heap = HeapRing::new(24);
        heap.ring.enqueue(&[1, 2, 3, 4]).unwrap();

        let mut bytes = [0u8; 8];
        heap.ring.read_bytes(0, &mut bytes);
        assert_eq!(bytes, [4, 0, 0, 0, 1, 2, 3, 4]);

        let diag = heap.ring.diagnostics();
        assert_eq!(diag.write_cursor, 8);
        assert_eq!(diag.occupancy, 8);
        assert_eq!(diag.read_cursor, 0);
    }

    #[test]
    fn enqueue_stamps_wrap_marker() {
        let heap = HeapRing::new(30);
        heap.ring.enqueue(&[0xAA; 8]).unwrap();
        heap.ring.enqueue(&[0xBB; 8]).unwrap();
        heap.ring.dequeue().unwrap();
        heap.ring.dequeue().unwrap();

        heap.ring.enqueue(&[0xCC; 6]).unwrap();
        assert_eq!(heap.ring.read_prefix(24), WRAP_MARKER);
        assert_eq!(heap.ring.read_prefix(0), 6);

        let diag = heap.ring.diagnostics();
        assert_eq!(diag.write_cursor, 10);
        assert_eq!(diag.occupancy, 16);
    }

    #[test]
    fn enqueue_ending_at_region_end_wraps_cursor() {
        let heap = HeapRing::new(16);
        heap.ring.enqueue(&[7; 12]).unwrap();
        let diag = heap.ring.diagnostics();
        assert_eq!(diag.write_cursor, 0);
        assert_eq!(diag.occupancy, 16);
    }
}
