//! Segmented pool management and chunk allocation routing.

use super::allocator::BumpAllocator;
use super::pool::{MemPool, MemPoolInfo};
use crate::chunk::{align_up, ChunkHeader, ChunkLayout, SharedChunk, CHUNK_MEMORY_ALIGNMENT};
use crate::config::MemPoolConfig;
use crate::error::{AllocationError, Result};
use crate::fault::{self, FaultKind, Severity};
use crate::port::UniquePortId;
use std::ptr::NonNull;
use std::sync::atomic::AtomicU32;

/// In-range control block heading the pool table.
///
/// The registry and its `MemPool` array are carved as one block at the
/// front of the managed range; every chunk header records the registry's
/// address so the last [`SharedChunk`] holder can return the chunk without
/// carrying a pool back-reference; the owning pool is found by an
/// address-range scan over the table.
#[repr(C)]
pub struct PoolRegistry {
    num_pools: u32,
    _reserved: u32,
}

impl PoolRegistry {
    /// The pool table, ascending in chunk size.
    pub(crate) fn pools(&self) -> &[MemPool] {
        // SAFETY: `MemoryManager::new` wrote `num_pools` initialized pools
        // directly behind this header, within the same carve.
        unsafe {
            let first = (self as *const Self).add(1).cast::<MemPool>();
            std::slice::from_raw_parts(first, self.num_pools as usize)
        }
    }

    /// Return `chunk` to the pool whose slot array contains it.
    ///
    /// Chunks from outside every pool are reported to the fault handler.
    pub(crate) fn free_chunk(&self, chunk: NonNull<ChunkHeader>) {
        let address = chunk.as_ptr() as usize;
        match self.pools().iter().find(|pool| pool.contains(address)) {
            Some(pool) => pool.free_chunk(chunk.cast::<u8>()),
            None => fault::report(FaultKind::MempoolChunkNotInPool, Severity::Fatal),
        }
    }
}

/// Routes chunk allocations to the smallest sufficient pool.
///
/// The manager itself is a copyable handle onto a [`PoolRegistry`] living
/// in the managed byte range; cloning it is free and every clone sees the
/// same pools. It is constructed once from a validated [`MemPoolConfig`],
/// carving all pool storage up front; nothing is allocated per chunk.
///
/// # Example
///
/// ```rust
/// use std::ptr::NonNull;
/// use zenith::config::MemPoolConfig;
/// use zenith::mem::{BumpAllocator, MemoryManager};
///
/// let mut config = MemPoolConfig::new();
/// config.add_pool(128, 20).add_pool(256, 20);
///
/// let mut memory = vec![0u8; MemoryManager::required_memory_size(&config)];
/// let base = NonNull::new(memory.as_mut_ptr()).unwrap();
/// // SAFETY: `memory` outlives the manager and every chunk.
/// let mut allocator = unsafe { BumpAllocator::new(base, memory.len()) };
/// let manager = MemoryManager::new(&config, &mut allocator).unwrap();
/// assert_eq!(manager.pool_count(), 2);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct MemoryManager {
    registry: NonNull<PoolRegistry>,
}

impl MemoryManager {
    /// Build the pool registry from `config`, carving storage from
    /// `allocator`.
    ///
    /// Each configured chunk size is a user-visible capacity; the pools
    /// allocate that plus the chunk header overhead per chunk.
    pub fn new(config: &MemPoolConfig, allocator: &mut BumpAllocator) -> Result<Self> {
        config.validate()?;

        let entries = config.entries();
        let table_size = std::mem::size_of::<PoolRegistry>()
            + entries.len() * std::mem::size_of::<MemPool>();
        let registry = allocator
            .allocate(table_size, std::mem::align_of::<MemPool>())?
            .cast::<PoolRegistry>();

        // SAFETY: freshly carved block, aligned for both the registry
        // header and the pool table behind it.
        unsafe {
            registry.as_ptr().write(PoolRegistry {
                num_pools: entries.len() as u32,
                _reserved: 0,
            });

            let first_pool = registry.as_ptr().add(1).cast::<MemPool>();
            for (index, entry) in entries.iter().enumerate() {
                MemPool::init_at(
                    NonNull::new_unchecked(first_pool.add(index)),
                    entry.chunk_size + std::mem::size_of::<ChunkHeader>() as u32,
                    entry.chunk_count,
                    allocator,
                )?;
            }
        }

        Ok(Self { registry })
    }

    /// Bytes a [`BumpAllocator`] range must provide for `config`,
    /// including bookkeeping and worst-case alignment padding.
    pub fn required_memory_size(config: &MemPoolConfig) -> usize {
        let header_overhead = std::mem::size_of::<ChunkHeader>();
        let mut total = std::mem::size_of::<PoolRegistry>()
            + config.entries().len() * std::mem::size_of::<MemPool>()
            + CHUNK_MEMORY_ALIGNMENT;
        for entry in config.entries() {
            let chunk_size = entry.chunk_size as usize + header_overhead;
            total += align_up(
                entry.chunk_count as usize * std::mem::size_of::<AtomicU32>(),
                CHUNK_MEMORY_ALIGNMENT,
            );
            total += entry.chunk_count as usize * chunk_size + CHUNK_MEMORY_ALIGNMENT;
        }
        total
    }

    /// Allocate a chunk for the given payload and user-header request and
    /// stamp its header.
    ///
    /// The smallest pool whose chunks can hold the request at any base
    /// address is selected; an exhausted pool is not papered over by a
    /// larger one.
    pub fn get_chunk(
        &self,
        origin_id: UniquePortId,
        user_payload_size: u32,
        user_payload_alignment: u32,
        user_header_size: u32,
        user_header_alignment: u32,
    ) -> std::result::Result<SharedChunk, AllocationError> {
        let layout = ChunkLayout::compute(
            user_payload_size,
            user_payload_alignment,
            user_header_size,
            user_header_alignment,
        )?;
        self.get_chunk_with_layout(origin_id, &layout)
    }

    pub(crate) fn get_chunk_with_layout(
        &self,
        origin_id: UniquePortId,
        layout: &ChunkLayout,
    ) -> std::result::Result<SharedChunk, AllocationError> {
        let required = layout.required_chunk_size();
        let pools = self.registry().pools();

        let index = pools.partition_point(|pool| pool.chunk_size() < required);
        let Some(pool) = pools.get(index) else {
            tracing::error!(
                required_chunk_size = required,
                largest_chunk_size = pools.last().map(MemPool::chunk_size),
                "no memory pool can hold the requested chunk"
            );
            return Err(AllocationError::NoMempoolsAvailable);
        };

        let Some(chunk) = pool.get_chunk() else {
            tracing::warn!(
                chunk_size = pool.chunk_size(),
                "memory pool ran out of chunks"
            );
            return Err(AllocationError::RunningOutOfChunks);
        };

        // SAFETY: `chunk` is a fresh, exclusively owned block of
        // `pool.chunk_size()` bytes, aligned to the chunk alignment.
        let header = unsafe {
            ChunkHeader::init(
                chunk,
                pool.chunk_size(),
                self.registry.as_ptr(),
                origin_id,
                layout,
            )
        };
        // SAFETY: the header starts with a reference count of one, which
        // this handle adopts.
        Ok(unsafe { SharedChunk::from_header(header) })
    }

    /// Number of configured pools.
    pub fn pool_count(&self) -> usize {
        self.registry().pools().len()
    }

    /// Usage snapshot of the pool at `index` (ascending chunk size).
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn pool_info(&self, index: usize) -> MemPoolInfo {
        self.registry().pools()[index].info()
    }

    fn registry(&self) -> &PoolRegistry {
        // SAFETY: construction initialized the registry; the managed range
        // outlives the handle per `BumpAllocator::new`'s contract.
        unsafe { self.registry.as_ref() }
    }
}

// SAFETY: the handle only points at in-range state whose mutable parts are
// atomics; sharing it across threads is how multiple publishers allocate
// from the same pools.
unsafe impl Send for MemoryManager {}
unsafe impl Sync for MemoryManager {}
