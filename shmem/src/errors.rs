use shared_memory::ShmemError;
use thiserror::Error;

/// Every failure a queue operation can surface.
///
/// An empty queue is not an error: `dequeue` reports it as `Ok(None)`.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The payload was empty. Nothing was written.
    #[error("payload must contain at least one byte")]
    InvalidArgument,

    /// The record does not fit, either ever or right now. Nothing was written.
    #[error("record of {required} bytes does not fit, {available} bytes available")]
    CapacityExceeded { required: usize, available: usize },

    #[error("failed to construct queue `{name}`: {cause}")]
    Construction {
        name: String,
        #[source]
        cause: ConstructionError,
    },

    #[error("queue has been closed")]
    Disposed,

    /// A length prefix that cannot describe a record inside the published occupancy.
    #[error("corrupt record at offset {offset} with length {length}")]
    CorruptRecord { offset: u32, length: u32 },
}

#[derive(Debug, Error)]
pub enum ConstructionError {
    #[error("capacity must be between 1 and {max} bytes, got {got}")]
    InvalidCapacity { got: usize, max: usize },

    #[error("a region with this name already exists")]
    RegionExists,

    #[error("no region with this name exists")]
    RegionMissing,

    #[error("region exists but its creator has not finished initializing it")]
    NotInitialized,

    #[error("capacity mismatch: expected {expected} bytes, region holds {found}")]
    CapacityMismatch { expected: usize, found: usize },

    #[error("mapping is {found} bytes, at least {expected} required")]
    RegionTooSmall { expected: usize, found: usize },

    #[error("shared memory error: {0}")]
    SharedMemory(ShmemError),
}

// ENOENT on unix, ERROR_FILE_NOT_FOUND on windows.
const NOT_FOUND: u32 = 2;

impl From<ShmemError> for ConstructionError {
    fn from(err: ShmemError) -> Self {
        match err {
            ShmemError::MappingIdExists | ShmemError::LinkExists => ConstructionError::RegionExists,
            ShmemError::MapOpenFailed(NOT_FOUND) | ShmemError::LinkDoesNotExist => {
                ConstructionError::RegionMissing
            }
            other => ConstructionError::SharedMemory(other),
        }
    }
}

impl ConstructionError {
    pub(crate) fn named(self, name: &str) -> QueueError {
        QueueError::Construction {
            name: name.to_string(),
            cause: self,
        }
    }
}
