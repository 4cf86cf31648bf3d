//! Reference-counted chunk handles.

use super::header::ChunkHeader;
use std::ptr::NonNull;

/// A reference-counted handle to one chunk.
///
/// The count lives in the chunk's own header, so handles held by the
/// sender, the history ring, and any number of subscriber queues all share
/// it. Cloning increments, dropping decrements; the last holder returns
/// the chunk to its pool through the registry recorded in the header.
///
/// Equality compares chunk identity (the header address), not contents.
pub struct SharedChunk {
    header: NonNull<ChunkHeader>,
}

impl SharedChunk {
    /// Adopt a header whose reference count already accounts for this
    /// handle.
    ///
    /// # Safety
    ///
    /// `header` must point to a live, stamped [`ChunkHeader`] and one unit
    /// of its reference count must belong to the caller.
    pub(crate) unsafe fn from_header(header: NonNull<ChunkHeader>) -> Self {
        Self { header }
    }

    /// The chunk's header.
    #[inline]
    pub fn header(&self) -> &ChunkHeader {
        // SAFETY: the handle owns a reference, so the chunk is alive.
        unsafe { self.header.as_ref() }
    }

    /// The chunk's header address; stable for the chunk's lifetime.
    #[inline]
    pub fn header_ptr(&self) -> NonNull<ChunkHeader> {
        self.header
    }

    /// Pointer to the user payload region.
    #[inline]
    pub fn user_payload(&self) -> *mut u8 {
        self.header().user_payload()
    }

    /// The user payload region as a byte slice.
    ///
    /// Chunks are single-writer before being sent and read-only afterwards,
    /// so holders may read the payload for as long as they keep the handle.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        let header = self.header();
        // SAFETY: the payload region lies inside the chunk, which stays
        // alive while this handle exists.
        unsafe {
            std::slice::from_raw_parts(header.user_payload(), header.user_payload_size() as usize)
        }
    }

    /// Current reference count.
    #[inline]
    pub fn ref_count(&self) -> u32 {
        self.header().ref_count()
    }

    /// Dissolve the handle into its raw header pointer without touching
    /// the reference count. The counterpart of [`SharedChunk::from_raw`];
    /// used by the lock-free queue rings, whose slots are single pointers.
    pub(crate) fn into_raw(self) -> NonNull<ChunkHeader> {
        let header = self.header;
        std::mem::forget(self);
        header
    }

    /// Reassemble a handle from [`SharedChunk::into_raw`].
    ///
    /// # Safety
    ///
    /// `header` must come from `into_raw` and be reassembled exactly once.
    pub(crate) unsafe fn from_raw(header: NonNull<ChunkHeader>) -> Self {
        Self { header }
    }
}

impl Clone for SharedChunk {
    fn clone(&self) -> Self {
        self.header().ref_inc();
        Self {
            header: self.header,
        }
    }
}

impl Drop for SharedChunk {
    fn drop(&mut self) {
        if self.header().ref_dec() {
            let registry = self.header().registry();
            // SAFETY: we were the last holder, so the chunk can be
            // returned; the registry outlives every chunk carved from its
            // memory range.
            unsafe { (*registry).free_chunk(self.header) };
        }
    }
}

impl PartialEq for SharedChunk {
    fn eq(&self, other: &Self) -> bool {
        self.header == other.header
    }
}

impl Eq for SharedChunk {}

impl std::fmt::Debug for SharedChunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedChunk")
            .field("header", &self.header.as_ptr())
            .field("origin_id", &self.header().origin_id())
            .field("sequence_number", &self.header().sequence_number())
            .field("ref_count", &self.ref_count())
            .finish()
    }
}

// SAFETY: the handle is a pointer to shared-memory state whose mutable
// parts are atomics; handing it to another thread hands over one unit of
// the reference count.
unsafe impl Send for SharedChunk {}
unsafe impl Sync for SharedChunk {}
