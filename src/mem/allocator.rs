//! Bump allocation over a caller-provided byte range.

use crate::chunk::align_up;
use crate::error::{Error, Result};
use std::ptr::NonNull;

/// Carves aligned blocks out of one flat byte range, front to back.
///
/// This is a setup-time tool only: pool bookkeeping and chunk storage are
/// carved once while a [`MemoryManager`](super::MemoryManager) is built,
/// and nothing is ever handed back. Where the range comes from (a mapped
/// shared-memory segment, a static buffer, a heap allocation) is the
/// caller's business.
pub struct BumpAllocator {
    base: NonNull<u8>,
    capacity: usize,
    offset: usize,
}

impl BumpAllocator {
    /// Wrap the byte range `[base, base + capacity)`.
    ///
    /// # Safety
    ///
    /// The range must be valid for reads and writes, must not be accessed
    /// through other references while carved blocks are in use, and must
    /// outlive everything allocated from it.
    pub unsafe fn new(base: NonNull<u8>, capacity: usize) -> Self {
        Self {
            base,
            capacity,
            offset: 0,
        }
    }

    /// Carve `size` bytes aligned to `align` (a power of two).
    ///
    /// # Errors
    ///
    /// Fails when the remaining range cannot fit the padded request.
    pub fn allocate(&mut self, size: usize, align: usize) -> Result<NonNull<u8>> {
        debug_assert!(align.is_power_of_two());

        let base = self.base.as_ptr() as usize;
        let aligned = align_up(base + self.offset, align);
        let end = aligned.checked_add(size).ok_or_else(|| {
            Error::AllocationFailed(format!("allocation of {size} bytes overflows"))
        })?;

        if end > base + self.capacity {
            return Err(Error::AllocationFailed(format!(
                "needed {} bytes aligned to {}, but only {} of {} remain",
                size,
                align,
                self.capacity - self.offset,
                self.capacity
            )));
        }

        self.offset = end - base;
        // SAFETY: `aligned` lies within the caller-provided range.
        Ok(unsafe { NonNull::new_unchecked(aligned as *mut u8) })
    }

    /// Bytes handed out so far, including alignment padding.
    pub fn used(&self) -> usize {
        self.offset
    }

    /// Bytes still available, ignoring future alignment padding.
    pub fn remaining(&self) -> usize {
        self.capacity - self.offset
    }
}
