use shared_memory::{Shmem, ShmemConf};
use tracing::debug;

use crate::errors::{ConstructionError, QueueError};
use crate::layout::{check_capacity, region_size, QueueConfig, RingBuffer, Role};

/// POSIX shared memory object names start with a single slash.
pub fn os_id(name: &str) -> String {
    format!("/{}", name.trim_start_matches('/'))
}

/// A named shared memory mapping with the ring buffer engine laid over it.
///
/// Dropping a creator's region unlinks the object; dropping an attacher's
/// region only unmaps it.
pub struct Region {
    ring: RingBuffer,
    shmem: Shmem,
    role: Role,
}

impl Region {
    pub fn open(cfg: &QueueConfig, role: Role) -> Result<Region, QueueError> {
        match role {
            Role::Creator => Region::create(cfg),
            Role::Attacher => Region::attach(cfg),
        }
    }

    pub fn create(cfg: &QueueConfig) -> Result<Region, QueueError> {
        let capacity = check_capacity(cfg.capacity).map_err(|e| e.named(&cfg.name))?;
        let shmem = ShmemConf::new()
            .size(region_size(cfg.capacity))
            .os_id(os_id(&cfg.name))
            .create()
            .map_err(|e| ConstructionError::from(e).named(&cfg.name))?;

        // Fresh mappings are zero filled and page aligned.
        let ring = unsafe { RingBuffer::init(shmem.as_ptr(), capacity) };
        debug!(
            name = %cfg.name,
            os_id = shmem.get_os_id(),
            capacity,
            mapped = shmem.len(),
            "created queue region"
        );
        Ok(Region {
            ring,
            shmem,
            role: Role::Creator,
        })
    }

    pub fn attach(cfg: &QueueConfig) -> Result<Region, QueueError> {
        let capacity = check_capacity(cfg.capacity).map_err(|e| e.named(&cfg.name))?;
        let mut shmem = ShmemConf::new()
            .os_id(os_id(&cfg.name))
            .open()
            .map_err(|e| ConstructionError::from(e).named(&cfg.name))?;
        shmem.set_owner(false);

        let ring = unsafe { RingBuffer::attach(shmem.as_ptr(), shmem.len(), capacity) }
            .map_err(|e| e.named(&cfg.name))?;
        debug!(
            name = %cfg.name,
            os_id = shmem.get_os_id(),
            capacity,
            mapped = shmem.len(),
            "attached queue region"
        );
        Ok(Region {
            ring,
            shmem,
            role: Role::Attacher,
        })
    }

    #[inline]
    pub fn ring(&self) -> &RingBuffer {
        &self.ring
    }

    pub fn role(&self) -> Role {
        self.role
    }
}

impl Drop for Region {
    fn drop(&mut self) {
        match self.role {
            Role::Creator => debug!(os_id = self.shmem.get_os_id(), "releasing queue region"),
            Role::Attacher => debug!(os_id = self.shmem.get_os_id(), "detaching queue region"),
        }
    }
}
