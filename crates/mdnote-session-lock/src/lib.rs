//! Session lock managers: one exclusive, TTL-bound editing claim per file.
//!
//! Both implementations share `LockPolicy` from the core crate and differ
//! only in how the read-decide-write step is made atomic.

mod memory;
mod r2;

pub use memory::MemoryLockManager;
pub use r2::{R2LockManager, CAS_MAX_ATTEMPTS, DEFAULT_LOCK_PREFIX};
