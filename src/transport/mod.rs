//! Publisher-side chunk transport: queues, fan-out, and the sender state
//! machine.
//!
//! Control flow of one publication:
//!
//! ```text
//! ChunkSender::try_allocate ─> MemoryManager ─> MemPool       (chunk born)
//!        │ in-place payload construction
//! ChunkSender::send ─> history ring ─> ChunkDistributor
//!                                          │ per-queue policy
//!                          ChunkQueueData … ChunkQueueData
//!                                 │                │
//!                          ChunkQueuePopper  ChunkQueuePopper (subscribers)
//! ```
//!
//! Delivery is by reference: each queue holds a [`SharedChunk`] clone and
//! the chunk returns to its pool when the last holder lets go.
//!
//! [`SharedChunk`]: crate::chunk::SharedChunk

mod distributor;
mod queue;
mod ring;
mod sender;

pub use distributor::{ChunkDistributor, ChunkDistributorData};
pub use queue::{ChunkQueueData, ChunkQueuePopper, ChunkQueuePusher, PushOutcome};
pub use sender::{ChunkSender, ChunkSenderData};

#[cfg(test)]
pub(crate) mod test_support {
    use crate::chunk::{SharedChunk, DEFAULT_USER_PAYLOAD_ALIGNMENT, NO_USER_HEADER_ALIGNMENT, NO_USER_HEADER_SIZE};
    use crate::config::MemPoolConfig;
    use crate::mem::{BumpAllocator, MemoryManager};
    use crate::port::UniquePortId;
    use std::ptr::NonNull;

    /// A flat byte range with a configured manager, plus helpers to mint
    /// chunks carrying a `u64` marker payload.
    pub(crate) struct TestMemory {
        _memory: Vec<u8>,
        pub(crate) manager: MemoryManager,
    }

    impl TestMemory {
        pub(crate) fn new(pools: &[(u32, u32)]) -> Self {
            let mut config = MemPoolConfig::new();
            for &(chunk_size, chunk_count) in pools {
                config.add_pool(chunk_size, chunk_count);
            }

            let mut memory = vec![0u8; MemoryManager::required_memory_size(&config)];
            let base = NonNull::new(memory.as_mut_ptr()).unwrap();
            // SAFETY: `memory` lives as long as this fixture, which every
            // test keeps alive for the duration.
            let mut allocator = unsafe { BumpAllocator::new(base, memory.len()) };
            let manager = MemoryManager::new(&config, &mut allocator).unwrap();

            Self {
                _memory: memory,
                manager,
            }
        }

        /// Allocate a chunk and write `marker` at the start of its payload.
        pub(crate) fn chunk_with_payload(&self, marker: u64) -> SharedChunk {
            let chunk = self
                .manager
                .get_chunk(
                    UniquePortId::new(),
                    std::mem::size_of::<u64>() as u32,
                    DEFAULT_USER_PAYLOAD_ALIGNMENT,
                    NO_USER_HEADER_SIZE,
                    NO_USER_HEADER_ALIGNMENT,
                )
                .unwrap();
            // SAFETY: freshly allocated chunk, payload region is ours.
            unsafe { chunk.user_payload().cast::<u64>().write(marker) };
            chunk
        }

        /// Read back the `u64` marker from a chunk's payload.
        pub(crate) fn read_payload(chunk: &SharedChunk) -> u64 {
            // SAFETY: written by `chunk_with_payload`.
            unsafe { chunk.user_payload().cast::<u64>().read() }
        }
    }

    // SAFETY: the manager handle and raw range are shareable; tests only
    // move the fixture behind `Arc`.
    unsafe impl Send for TestMemory {}
    unsafe impl Sync for TestMemory {}
}
