//! Chunk layout computation.
//!
//! A chunk is one fixed-size block carved from a memory pool:
//!
//! ```text
//! ┌──────────────┬─────────────────┬──────────────────────────────┐
//! │ ChunkHeader  │ user header     │ user payload                 │
//! │ (offset 0)   │ (optional)      │ (requested alignment)        │
//! └──────────────┴─────────────────┴──────────────────────────────┘
//! ```
//!
//! [`ChunkLayout::compute`] applies the usual layout-builder rules: each
//! region starts at the next multiple of its alignment. Chunk bases are
//! only guaranteed to be aligned to [`CHUNK_MEMORY_ALIGNMENT`], so
//! alignments above that are paid for with worst-case padding in the
//! required size and resolved to exact offsets once the concrete base
//! address is known.

use crate::error::LayoutError;

/// Alignment of every chunk base and of the chunk header.
pub const CHUNK_MEMORY_ALIGNMENT: usize = 8;

/// Payload alignment applied when the caller requests none stricter.
pub const DEFAULT_USER_PAYLOAD_ALIGNMENT: u32 = 8;

/// User-header size denoting "no user header".
pub const NO_USER_HEADER_SIZE: u32 = 0;

/// User-header alignment to pass along with [`NO_USER_HEADER_SIZE`].
pub const NO_USER_HEADER_ALIGNMENT: u32 = 1;

/// Round `value` up to the next multiple of `align` (a power of two).
#[inline]
pub(crate) fn align_up(value: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    (value + align - 1) & !(align - 1)
}

/// Validated placement parameters for one chunk.
///
/// The layout captures the request and the worst-case total size needed to
/// satisfy it from a pool; exact region offsets depend on the chunk's base
/// address and are produced by [`ChunkLayout::offsets_for`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkLayout {
    user_payload_size: u32,
    user_payload_alignment: u32,
    user_header_size: u32,
    user_header_alignment: u32,
    required_chunk_size: u32,
}

impl ChunkLayout {
    /// Compute the layout for a payload/user-header request.
    ///
    /// # Errors
    ///
    /// Fails when an alignment is not a power of two, when a user-header
    /// alignment other than [`NO_USER_HEADER_ALIGNMENT`] accompanies a
    /// zero-sized user header, or when the required size overflows `u32`.
    pub fn compute(
        user_payload_size: u32,
        user_payload_alignment: u32,
        user_header_size: u32,
        user_header_alignment: u32,
    ) -> Result<Self, LayoutError> {
        if !user_payload_alignment.is_power_of_two() {
            return Err(LayoutError::PayloadAlignmentNotPowerOfTwo);
        }
        if !user_header_alignment.is_power_of_two() {
            return Err(LayoutError::UserHeaderAlignmentNotPowerOfTwo);
        }
        if user_header_size == NO_USER_HEADER_SIZE
            && user_header_alignment != NO_USER_HEADER_ALIGNMENT
        {
            return Err(LayoutError::UserHeaderAlignmentWithoutUserHeader);
        }

        let header_size = std::mem::size_of::<super::ChunkHeader>() as u64;
        let payload_alignment =
            u64::from(user_payload_alignment.max(DEFAULT_USER_PAYLOAD_ALIGNMENT));
        let chunk_alignment = CHUNK_MEMORY_ALIGNMENT as u64;

        // Worst-case padding to reach an alignment stricter than the chunk
        // base guarantee.
        let slack = |alignment: u64| alignment.saturating_sub(chunk_alignment);

        let mut position = header_size;
        if user_header_size > NO_USER_HEADER_SIZE {
            position += slack(u64::from(user_header_alignment));
            position += u64::from(user_header_size);
        }
        position = align_up_u64(position, chunk_alignment);
        position += slack(payload_alignment);
        position += u64::from(user_payload_size);

        let required_chunk_size =
            u32::try_from(position).map_err(|_| LayoutError::RequiredSizeOverflow)?;

        Ok(Self {
            user_payload_size,
            user_payload_alignment,
            user_header_size,
            user_header_alignment,
            required_chunk_size,
        })
    }

    /// Total chunk size sufficient for this layout at any chunk base.
    #[inline]
    pub fn required_chunk_size(&self) -> u32 {
        self.required_chunk_size
    }

    /// Requested user payload size in bytes.
    #[inline]
    pub fn user_payload_size(&self) -> u32 {
        self.user_payload_size
    }

    /// Requested user payload alignment.
    #[inline]
    pub fn user_payload_alignment(&self) -> u32 {
        self.user_payload_alignment
    }

    /// Requested user header size in bytes (0 = none).
    #[inline]
    pub fn user_header_size(&self) -> u32 {
        self.user_header_size
    }

    /// Requested user header alignment.
    #[inline]
    pub fn user_header_alignment(&self) -> u32 {
        self.user_header_alignment
    }

    /// Resolve the exact region offsets for a chunk starting at `base`.
    ///
    /// Returns `(user_header_offset, user_payload_offset)` relative to the
    /// chunk base. With no user header the user-header offset degenerates
    /// to the end of the chunk header.
    pub(crate) fn offsets_for(&self, base: usize) -> (u32, u32) {
        debug_assert_eq!(base % CHUNK_MEMORY_ALIGNMENT, 0);

        let header_size = std::mem::size_of::<super::ChunkHeader>();
        let user_header_offset = if self.user_header_size > NO_USER_HEADER_SIZE {
            align_up(base + header_size, self.user_header_alignment as usize) - base
        } else {
            header_size
        };

        let payload_alignment = self
            .user_payload_alignment
            .max(DEFAULT_USER_PAYLOAD_ALIGNMENT) as usize;
        let user_payload_offset = align_up(
            base + user_header_offset + self.user_header_size as usize,
            payload_alignment,
        ) - base;

        debug_assert!(
            user_payload_offset + self.user_payload_size as usize
                <= self.required_chunk_size as usize
        );

        (user_header_offset as u32, user_payload_offset as u32)
    }
}

#[inline]
fn align_up_u64(value: u64, align: u64) -> u64 {
    (value + align - 1) & !(align - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: u32 = std::mem::size_of::<crate::chunk::ChunkHeader>() as u32;

    #[test]
    fn test_default_alignment_payload_follows_header() {
        let layout = ChunkLayout::compute(
            64,
            DEFAULT_USER_PAYLOAD_ALIGNMENT,
            NO_USER_HEADER_SIZE,
            NO_USER_HEADER_ALIGNMENT,
        )
        .unwrap();
        assert_eq!(layout.required_chunk_size(), HEADER + 64);

        let (_, payload_offset) = layout.offsets_for(0x1000);
        assert_eq!(payload_offset, HEADER);
    }

    #[test]
    fn test_large_alignment_pays_worst_case_padding() {
        let layout =
            ChunkLayout::compute(64, 128, NO_USER_HEADER_SIZE, NO_USER_HEADER_ALIGNMENT).unwrap();
        assert_eq!(layout.required_chunk_size(), HEADER + (128 - 8) + 64);

        // An 8-aligned but not 128-aligned base still yields an aligned payload.
        let base = 0x1008;
        let (_, payload_offset) = layout.offsets_for(base);
        assert_eq!((base + payload_offset as usize) % 128, 0);
        assert!(payload_offset + 64 <= layout.required_chunk_size());
    }

    #[test]
    fn test_user_header_placed_between_header_and_payload() {
        let layout = ChunkLayout::compute(16, 8, 24, 4).unwrap();
        let (user_header_offset, payload_offset) = layout.offsets_for(0x2000);
        assert_eq!(user_header_offset, HEADER);
        assert_eq!(payload_offset, align_up((HEADER + 24) as usize, 8) as u32);
    }

    #[test]
    fn test_rejects_non_power_of_two_alignments() {
        assert_eq!(
            ChunkLayout::compute(8, 3, NO_USER_HEADER_SIZE, NO_USER_HEADER_ALIGNMENT),
            Err(LayoutError::PayloadAlignmentNotPowerOfTwo)
        );
        assert_eq!(
            ChunkLayout::compute(8, 8, 16, 5),
            Err(LayoutError::UserHeaderAlignmentNotPowerOfTwo)
        );
    }

    #[test]
    fn test_rejects_alignment_for_missing_user_header() {
        assert_eq!(
            ChunkLayout::compute(8, 8, NO_USER_HEADER_SIZE, 8),
            Err(LayoutError::UserHeaderAlignmentWithoutUserHeader)
        );
    }

    #[test]
    fn test_required_size_is_monotonic_in_payload_size() {
        let mut previous = 0;
        for payload_size in (0..4096).step_by(64) {
            let layout = ChunkLayout::compute(
                payload_size,
                DEFAULT_USER_PAYLOAD_ALIGNMENT,
                NO_USER_HEADER_SIZE,
                NO_USER_HEADER_ALIGNMENT,
            )
            .unwrap();
            assert!(layout.required_chunk_size() >= previous);
            previous = layout.required_chunk_size();
        }
    }

    #[test]
    fn test_overflow_is_reported() {
        assert_eq!(
            ChunkLayout::compute(u32::MAX, 8, NO_USER_HEADER_SIZE, NO_USER_HEADER_ALIGNMENT),
            Err(LayoutError::RequiredSizeOverflow)
        );
    }
}
