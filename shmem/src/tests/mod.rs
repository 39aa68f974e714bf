use std::process;
use std::sync::atomic::{AtomicUsize, Ordering};

mod spsc_tests;

/// Region names unique per process and test, short enough for macOS' 31 byte limit.
pub(crate) fn unique_name() -> String {
    static SHMEM_ID_COUNTER: AtomicUsize = AtomicUsize::new(0);
    format!(
        "sq{}_{}",
        process::id(),
        SHMEM_ID_COUNTER.fetch_add(1, Ordering::SeqCst)
    )
}
