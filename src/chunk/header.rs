//! In-band chunk metadata.

use super::layout::ChunkLayout;
use crate::mem::PoolRegistry;
use crate::port::UniquePortId;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU32, Ordering};

/// Metadata prefix stamped at offset 0 of every chunk.
///
/// The header is `repr(C)` and contains only host-native scalar fields, so
/// its layout is byte-stable for every process of the same build on the
/// same host. The reference count lives in-band: it is shared by every
/// [`SharedChunk`](super::SharedChunk) handle to the chunk, wherever that
/// handle lives.
#[repr(C)]
pub struct ChunkHeader {
    /// Address of the pool registry this chunk was allocated from. The
    /// owning pool itself is found by range lookup over the registry's
    /// pool table, never stored here.
    registry: *const PoolRegistry,
    origin_id: UniquePortId,
    sequence_number: u64,
    ref_count: AtomicU32,
    chunk_size: u32,
    user_header_size: u32,
    user_header_offset: u32,
    user_payload_size: u32,
    user_payload_alignment: u32,
    user_payload_offset: u32,
    _reserved: u32,
}

impl ChunkHeader {
    /// Stamp a fresh header at `chunk` and return it with a reference
    /// count of one.
    ///
    /// # Safety
    ///
    /// `chunk` must point to at least `chunk_size` writable bytes aligned
    /// to [`CHUNK_MEMORY_ALIGNMENT`](super::CHUNK_MEMORY_ALIGNMENT), and
    /// `chunk_size` must satisfy `layout.required_chunk_size()`.
    pub(crate) unsafe fn init(
        chunk: NonNull<u8>,
        chunk_size: u32,
        registry: *const PoolRegistry,
        origin_id: UniquePortId,
        layout: &ChunkLayout,
    ) -> NonNull<ChunkHeader> {
        debug_assert!(layout.required_chunk_size() <= chunk_size);
        let (user_header_offset, user_payload_offset) = layout.offsets_for(chunk.as_ptr() as usize);

        let header = chunk.cast::<ChunkHeader>();
        // SAFETY: the caller guarantees the chunk is writable, aligned, and
        // large enough for the header plus the laid-out regions.
        unsafe {
            header.as_ptr().write(ChunkHeader {
                registry,
                origin_id,
                sequence_number: 0,
                ref_count: AtomicU32::new(1),
                chunk_size,
                user_header_size: layout.user_header_size(),
                user_header_offset,
                user_payload_size: layout.user_payload_size(),
                user_payload_alignment: layout.user_payload_alignment(),
                user_payload_offset,
                _reserved: 0,
            });
        }
        header
    }

    /// Re-stamp this header for a new request, keeping the chunk itself.
    ///
    /// Used on the last-chunk reuse path; the caller must hold the only
    /// reference. The chunk size, registry, and reference count carry over.
    pub(crate) fn restamp(&mut self, origin_id: UniquePortId, layout: &ChunkLayout) {
        debug_assert!(self.fits(layout));
        debug_assert_eq!(self.ref_count(), 1);

        let (user_header_offset, user_payload_offset) =
            layout.offsets_for(self as *const Self as usize);
        self.origin_id = origin_id;
        self.sequence_number = 0;
        self.user_header_size = layout.user_header_size();
        self.user_header_offset = user_header_offset;
        self.user_payload_size = layout.user_payload_size();
        self.user_payload_alignment = layout.user_payload_alignment();
        self.user_payload_offset = user_payload_offset;
    }

    /// Whether a chunk of this size can hold `layout` regardless of base
    /// address.
    #[inline]
    pub fn fits(&self, layout: &ChunkLayout) -> bool {
        layout.required_chunk_size() <= self.chunk_size
    }

    /// Total size of the chunk this header prefixes.
    #[inline]
    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    /// Identity of the publisher that allocated this chunk.
    #[inline]
    pub fn origin_id(&self) -> UniquePortId {
        self.origin_id
    }

    /// Per-publisher sequence number, assigned when the chunk is sent.
    #[inline]
    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub(crate) fn set_sequence_number(&mut self, sequence_number: u64) {
        self.sequence_number = sequence_number;
    }

    /// Size of the user payload region in bytes.
    #[inline]
    pub fn user_payload_size(&self) -> u32 {
        self.user_payload_size
    }

    /// Alignment requested for the user payload region.
    #[inline]
    pub fn user_payload_alignment(&self) -> u32 {
        self.user_payload_alignment
    }

    /// Size of the user header region in bytes (0 = none).
    #[inline]
    pub fn user_header_size(&self) -> u32 {
        self.user_header_size
    }

    /// Pointer to the user payload region.
    #[inline]
    pub fn user_payload(&self) -> *mut u8 {
        (self as *const Self as *mut u8).wrapping_add(self.user_payload_offset as usize)
    }

    /// Pointer to the user header region, if one was requested.
    #[inline]
    pub fn user_header(&self) -> Option<*mut u8> {
        (self.user_header_size > 0).then(|| {
            (self as *const Self as *mut u8).wrapping_add(self.user_header_offset as usize)
        })
    }

    /// Current reference count.
    #[inline]
    pub fn ref_count(&self) -> u32 {
        self.ref_count.load(Ordering::Acquire)
    }

    pub(crate) fn registry(&self) -> *const PoolRegistry {
        self.registry
    }

    /// Increment the reference count.
    pub(crate) fn ref_inc(&self) {
        let old = self.ref_count.fetch_add(1, Ordering::AcqRel);
        debug_assert!(old > 0, "resurrected a dead chunk");
    }

    /// Decrement the reference count; returns true for the last holder.
    ///
    /// The release half of the `AcqRel` ordering publishes the holder's
    /// payload writes; the acquire half makes the last decrementer
    /// synchronize with every prior holder before the chunk is recycled.
    pub(crate) fn ref_dec(&self) -> bool {
        let old = self.ref_count.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(old > 0, "chunk reference count underflow");
        old == 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout_is_stable() {
        // The header must stay pointer-aligned and a multiple of the chunk
        // alignment so payload offsets computed from it hold.
        assert_eq!(std::mem::align_of::<ChunkHeader>(), 8);
        assert_eq!(std::mem::size_of::<ChunkHeader>() % 8, 0);
        assert_eq!(std::mem::size_of::<ChunkHeader>(), 56);
    }
}
