//! Fixed-chunk-size memory pools.

use super::allocator::BumpAllocator;
use super::freelist::IndexFreeList;
use crate::chunk::CHUNK_MEMORY_ALIGNMENT;
use crate::error::Result;
use crate::fault::{self, FaultKind, Severity};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU32, Ordering};

/// Usage snapshot of one pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemPoolInfo {
    /// Total size of each chunk, including the chunk header.
    pub chunk_size: u32,
    /// Number of chunks in the pool.
    pub num_chunks: u32,
    /// Chunks currently handed out.
    pub used_chunks: u32,
    /// Low-water mark of free chunks since construction.
    pub min_free: u32,
}

/// One pool of `num_chunks` chunks of `chunk_size` bytes each.
///
/// The pool control block is `repr(C)` and lives in the managed byte
/// range, as do its freelist link table and its chunk slots; both are
/// addressed by offsets relative to the control block, so the containing
/// range is position-independent. All mutable state is atomic: getting
/// and freeing chunks is lock-free from any thread or process mapping
/// the range.
#[repr(C)]
pub struct MemPool {
    chunk_size: u32,
    num_chunks: u32,
    used_chunks: AtomicU32,
    min_free: AtomicU32,
    freelist: IndexFreeList,
    next_table_offset: i64,
    slots_offset: i64,
}

impl MemPool {
    /// Initialize a pool control block in place, carving its link table
    /// and chunk slots from `allocator`.
    ///
    /// # Safety
    ///
    /// `pool` must point to writable, `MemPool`-aligned memory inside the
    /// same managed range `allocator` carves from, and must not be in use.
    pub(crate) unsafe fn init_at(
        pool: NonNull<MemPool>,
        chunk_size: u32,
        num_chunks: u32,
        allocator: &mut BumpAllocator,
    ) -> Result<()> {
        debug_assert!(chunk_size as usize % CHUNK_MEMORY_ALIGNMENT == 0);
        debug_assert!(num_chunks > 0);

        let next_table = allocator.allocate(
            num_chunks as usize * std::mem::size_of::<AtomicU32>(),
            CHUNK_MEMORY_ALIGNMENT,
        )?;
        let slots = allocator.allocate(
            num_chunks as usize * chunk_size as usize,
            CHUNK_MEMORY_ALIGNMENT,
        )?;

        let base = pool.as_ptr() as i64;
        // SAFETY: `pool` is writable and aligned per the caller's contract.
        unsafe {
            pool.as_ptr().write(MemPool {
                chunk_size,
                num_chunks,
                used_chunks: AtomicU32::new(0),
                min_free: AtomicU32::new(num_chunks),
                freelist: IndexFreeList::new(),
                next_table_offset: next_table.as_ptr() as i64 - base,
                slots_offset: slots.as_ptr() as i64 - base,
            });
            pool.as_ref().freelist.init(pool.as_ref().next_table());
        }
        Ok(())
    }

    /// Hand out one free chunk, or `None` when the pool is exhausted.
    pub fn get_chunk(&self) -> Option<NonNull<u8>> {
        let index = self.freelist.pop(self.next_table())?;
        let used = self.used_chunks.fetch_add(1, Ordering::AcqRel) + 1;
        self.min_free
            .fetch_min(self.num_chunks - used, Ordering::AcqRel);

        // SAFETY: the freelist only yields indices in `[0, num_chunks)`.
        let chunk = unsafe {
            self.slots_base()
                .add(index as usize * self.chunk_size as usize)
        };
        NonNull::new(chunk)
    }

    /// Return a chunk obtained from [`MemPool::get_chunk`].
    ///
    /// Pointers outside this pool's slot array, misaligned pointers, and
    /// chunks that are already free are reported to the fault handler and
    /// leave the pool unchanged.
    pub fn free_chunk(&self, chunk: NonNull<u8>) {
        let base = self.slots_base() as usize;
        let span = self.num_chunks as usize * self.chunk_size as usize;
        let address = chunk.as_ptr() as usize;

        if address < base
            || address >= base + span
            || (address - base) % self.chunk_size as usize != 0
        {
            fault::report(FaultKind::MempoolChunkNotInPool, Severity::Fatal);
            return;
        }

        let index = ((address - base) / self.chunk_size as usize) as u32;
        if self.freelist.push(self.next_table(), index) {
            self.used_chunks.fetch_sub(1, Ordering::AcqRel);
        } else {
            fault::report(FaultKind::MempoolPossibleDoubleFree, Severity::Severe);
        }
    }

    /// Usage snapshot.
    pub fn info(&self) -> MemPoolInfo {
        MemPoolInfo {
            chunk_size: self.chunk_size,
            num_chunks: self.num_chunks,
            used_chunks: self.used_chunks.load(Ordering::Acquire),
            min_free: self.min_free.load(Ordering::Acquire),
        }
    }

    /// Total size of each chunk, including the chunk header.
    #[inline]
    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    /// Whether `address` lies within this pool's slot array.
    pub(crate) fn contains(&self, address: usize) -> bool {
        let base = self.slots_base() as usize;
        let span = self.num_chunks as usize * self.chunk_size as usize;
        (base..base + span).contains(&address)
    }

    fn next_table(&self) -> &[AtomicU32] {
        // SAFETY: `init_at` recorded the offset to `num_chunks` link
        // entries carved from the same range as this control block.
        unsafe {
            let table = (self as *const Self as *const u8).offset(self.next_table_offset as isize);
            std::slice::from_raw_parts(table.cast::<AtomicU32>(), self.num_chunks as usize)
        }
    }

    fn slots_base(&self) -> *mut u8 {
        // Offsets are relative so the containing range can live at any
        // mapping address.
        (self as *const Self as *mut u8).wrapping_offset(self.slots_offset as isize)
    }
}
