use tracing::debug;

use crate::errors::QueueError;
use crate::layout::{Diagnostics, QueueConfig, Role};
use crate::region::Region;

/// Single-producer/single-consumer message queue over a named shared memory region.
///
/// One process constructs it as [`Role::Creator`], the other as
/// [`Role::Attacher`] with the same name and capacity. Either side may enqueue
/// or dequeue, but at most one side may enqueue and at most one may dequeue;
/// concurrent producers or concurrent consumers are not supported.
///
/// The region is released by [`MessageQueue::close`] or on drop, whichever
/// comes first. After that every operation fails with [`QueueError::Disposed`].
pub struct MessageQueue {
    region: Option<Region>,
    cfg: QueueConfig,
    role: Role,
}

// The mapping is process wide, so the handle may move between threads. It is
// not `Sync`: two threads sharing one handle would be two producers.
unsafe impl Send for MessageQueue {}

impl MessageQueue {
    pub fn new(cfg: &QueueConfig, role: Role) -> Result<MessageQueue, QueueError> {
        let region = Region::open(cfg, role)?;
        Ok(MessageQueue {
            region: Some(region),
            cfg: cfg.clone(),
            role,
        })
    }

    /// Allocates a new region named `name`. Fails if one already exists.
    pub fn create(capacity: usize, name: &str) -> Result<MessageQueue, QueueError> {
        MessageQueue::new(&QueueConfig::new(name, capacity), Role::Creator)
    }

    /// Opens the region `name` created elsewhere with the same capacity.
    pub fn attach(capacity: usize, name: &str) -> Result<MessageQueue, QueueError> {
        MessageQueue::new(&QueueConfig::new(name, capacity), Role::Attacher)
    }

    #[inline]
    fn region(&self) -> Result<&Region, QueueError> {
        self.region.as_ref().ok_or(QueueError::Disposed)
    }

    /// Writes `payload` as one record, or fails without touching the queue.
    pub fn enqueue(&mut self, payload: &[u8]) -> Result<(), QueueError> {
        self.region()?.ring().enqueue(payload)
    }

    /// Takes the oldest record, or `Ok(None)` if there is none.
    pub fn dequeue(&mut self) -> Result<Option<Vec<u8>>, QueueError> {
        self.region()?.ring().dequeue()
    }

    pub fn diagnostics(&self) -> Result<Diagnostics, QueueError> {
        Ok(self.region()?.ring().diagnostics())
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn name(&self) -> &str {
        &self.cfg.name
    }

    pub fn capacity(&self) -> usize {
        self.cfg.capacity
    }

    pub fn is_closed(&self) -> bool {
        self.region.is_none()
    }

    /// Releases the region. A creator also unlinks it. Calling this again is a no-op.
    pub fn close(&mut self) {
        if let Some(region) = self.region.take() {
            debug!(name = %self.cfg.name, role = %region.role(), "closing queue");
        }
    }
}

impl Drop for MessageQueue {
    fn drop(&mut self) {
        self.close();
    }
}
