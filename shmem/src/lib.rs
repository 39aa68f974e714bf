//! A single-producer/single-consumer byte message queue living in a named
//! shared memory region, so two processes can exchange length-prefixed
//! records without sockets or files.

mod errors;
pub mod layout;
pub mod queue;
mod reader;
pub mod region;
mod writer;

#[cfg(test)]
mod tests;

pub use errors::{ConstructionError, QueueError};
pub use layout::{Diagnostics, QueueConfig, Role, MAX_CAPACITY, RECORD_PREFIX_LEN};
pub use queue::MessageQueue;
