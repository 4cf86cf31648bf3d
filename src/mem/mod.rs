//! Segmented pool memory management.
//!
//! The memory subsystem turns one flat byte range into a set of
//! fixed-chunk-size pools and routes allocation requests to the smallest
//! pool that fits:
//!
//! - [`BumpAllocator`]: carves pool bookkeeping and chunk storage out of
//!   the caller's byte range at construction time
//! - [`MemPool`]: one pool of same-sized chunks over a lock-free index
//!   freelist, with usage and low-water accounting
//! - [`MemoryManager`]: the ordered pool collection; allocates and stamps
//!   chunks, and takes them back when the last holder lets go
//!
//! All pool state lives inside the managed range and is addressed
//! relatively, so the range can be a shared-memory segment mapped at
//! different addresses by different processes.

mod allocator;
mod freelist;
mod manager;
mod pool;

pub use allocator::BumpAllocator;
pub use manager::{MemoryManager, PoolRegistry};
pub use pool::{MemPool, MemPoolInfo};
