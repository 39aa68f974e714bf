use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicU32, Ordering};

use serde_derive::{Deserialize, Serialize};

use crate::errors::ConstructionError;

/// Bytes reserved at the start of the region for [`Header`].
pub const HEADER_SIZE: usize = 64;

/// Bytes of the little-endian length prefix in front of every payload.
pub const RECORD_PREFIX_LEN: usize = 4;

/// Largest capacity whose region size and cursors still fit in a `u32`.
pub const MAX_CAPACITY: usize = u32::MAX as usize - HEADER_SIZE;

/// Length prefix the writer stamps at the tail when it wraps a record to offset 0.
pub(crate) const WRAP_MARKER: u32 = 0;

const MAGIC: u32 = 0x5153_4d31; // "QSM1"

pub const DEFAULT_QUEUE_NAME: &str = "shmem-queue";
pub const DEFAULT_CAPACITY: usize = 1 << 20;

/// Header state shared by both processes. Lives at offset 0 of the region.
///
/// `write_cursor` is only stored by the enqueueing side, `read_cursor` only by
/// the dequeueing side. `occupancy` is adjusted by both with read-modify-write
/// operations and is the only value either side consults for admission and
/// emptiness.
#[repr(C)]
pub struct Header {
    magic: AtomicU32,
    capacity: AtomicU32,
    pub(crate) write_cursor: AtomicU32,
    pub(crate) read_cursor: AtomicU32,
    pub(crate) occupancy: AtomicU32,
    _pad: [u8; HEADER_SIZE - 5 * mem::size_of::<u32>()],
}

const _: () = assert!(mem::size_of::<Header>() == HEADER_SIZE);

/// Which side of the queue a process plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Allocates and stamps the region, and unlinks it on release.
    Creator,
    /// Opens an existing region, and only unmaps it on release.
    Attacher,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Creator => f.write_str("creator"),
            Role::Attacher => f.write_str("attacher"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Shared memory object name. Both sides must use the same one.
    pub name: String,
    /// Usable bytes in the circular region, excluding the header.
    pub capacity: usize,
}

impl QueueConfig {
    pub fn new<S: Into<String>>(name: S, capacity: usize) -> QueueConfig {
        QueueConfig {
            name: name.into(),
            capacity,
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        QueueConfig::new(DEFAULT_QUEUE_NAME, DEFAULT_CAPACITY)
    }
}

/// Point-in-time view of the header, for debugging and test narration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Diagnostics {
    pub capacity: u32,
    pub occupancy: u32,
    pub read_cursor: u32,
    pub write_cursor: u32,
}

impl Diagnostics {
    pub fn is_empty(&self) -> bool {
        self.occupancy == 0
    }

    pub fn free_bytes(&self) -> u32 {
        self.capacity - self.occupancy
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "capacity: {}, occupancy: {}, read cursor: {}, write cursor: {}",
            self.capacity, self.occupancy, self.read_cursor, self.write_cursor
        )
    }
}

#[inline]
pub fn region_size(capacity: usize) -> usize {
    HEADER_SIZE + capacity
}

pub(crate) fn check_capacity(capacity: usize) -> Result<u32, ConstructionError> {
    if capacity == 0 || capacity > MAX_CAPACITY {
        return Err(ConstructionError::InvalidCapacity {
            got: capacity,
            max: MAX_CAPACITY,
        });
    }
    Ok(capacity as u32)
}

/// The ring buffer engine bound to one mapped region.
///
/// Enqueue lives in `writer`, dequeue in `reader`. The engine holds raw
/// pointers into memory it does not own; whoever owns the mapping must keep it
/// alive for as long as the engine exists.
pub struct RingBuffer {
    header: *const Header,
    data: *mut u8,
    capacity: u32,
}

impl RingBuffer {
    /// Stamps a fresh header at `base` and returns the engine over it.
    ///
    /// # Safety
    /// `base` must be aligned for `Header`, valid for reads and writes of
    /// `region_size(capacity)` bytes, and outlive the returned engine.
    pub(crate) unsafe fn init(base: *mut u8, capacity: u32) -> RingBuffer {
        let header = &*(base as *const Header);
        header.capacity.store(capacity, Ordering::Relaxed);
        header.write_cursor.store(0, Ordering::Relaxed);
        header.read_cursor.store(0, Ordering::Relaxed);
        header.occupancy.store(0, Ordering::Relaxed);
        header.magic.store(MAGIC, Ordering::Release);
        RingBuffer {
            header: base as *const Header,
            data: base.add(HEADER_SIZE),
            capacity,
        }
    }

    /// Validates an already stamped header at `base` of a `mapped_len` byte mapping.
    ///
    /// # Safety
    /// `base` must be aligned for `Header`, valid for reads and writes of
    /// `mapped_len` bytes, and outlive the returned engine.
    pub(crate) unsafe fn attach(
        base: *mut u8,
        mapped_len: usize,
        expected_capacity: u32,
    ) -> Result<RingBuffer, ConstructionError> {
        if mapped_len < HEADER_SIZE {
            return Err(ConstructionError::RegionTooSmall {
                expected: HEADER_SIZE,
                found: mapped_len,
            });
        }
        let header = &*(base as *const Header);
        if header.magic.load(Ordering::Acquire) != MAGIC {
            return Err(ConstructionError::NotInitialized);
        }
        let capacity = header.capacity.load(Ordering::Relaxed);
        if capacity != expected_capacity {
            return Err(ConstructionError::CapacityMismatch {
                expected: expected_capacity as usize,
                found: capacity as usize,
            });
        }
        if mapped_len < region_size(capacity as usize) {
            return Err(ConstructionError::RegionTooSmall {
                expected: region_size(capacity as usize),
                found: mapped_len,
            });
        }
        Ok(RingBuffer {
            header: base as *const Header,
            data: base.add(HEADER_SIZE),
            capacity,
        })
    }

    #[inline]
    pub(crate) fn header(&self) -> &Header {
        unsafe { &*self.header }
    }

    #[inline]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn diagnostics(&self) -> Diagnostics {
        let header = self.header();
        Diagnostics {
            capacity: self.capacity,
            occupancy: header.occupancy.load(Ordering::Acquire),
            read_cursor: header.read_cursor.load(Ordering::Acquire),
            write_cursor: header.write_cursor.load(Ordering::Acquire),
        }
    }

    #[inline]
    pub(crate) fn write_bytes(&self, offset: u32, bytes: &[u8]) {
        let offset = offset as usize;
        assert!(offset + bytes.len() <= self.capacity as usize);
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), self.data.add(offset), bytes.len());
        }
    }

    #[inline]
    pub(crate) fn read_bytes(&self, offset: u32, out: &mut [u8]) {
        let offset = offset as usize;
        assert!(offset + out.len() <= self.capacity as usize);
        unsafe {
            std::ptr::copy_nonoverlapping(self.data.add(offset), out.as_mut_ptr(), out.len());
        }
    }

    #[inline]
    pub(crate) fn read_prefix(&self, offset: u32) -> u32 {
        let mut prefix = [0u8; RECORD_PREFIX_LEN];
        self.read_bytes(offset, &mut prefix);
        u32::from_le_bytes(prefix)
    }
}

/// Heap-backed region so engine tests do not need OS shared memory.
#[cfg(test)]
pub(crate) struct HeapRing {
    _backing: Vec<u64>,
    pub ring: RingBuffer,
}

#[cfg(test)]
impl HeapRing {
    pub fn new(capacity: u32) -> HeapRing {
        let words = (region_size(capacity as usize) + 7) / 8;
        let mut backing = vec![0u64; words];
        let ring = unsafe { RingBuffer::init(backing.as_mut_ptr() as *mut u8, capacity) };
        HeapRing {
            _backing: backing,
            ring,
        }
    }
}
