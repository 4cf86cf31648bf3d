//! Chunks: fixed-size blocks with in-band metadata and reference counting.
//!
//! A chunk is born in a [`MemPool`](crate::mem::MemPool), prefixed by a
//! [`ChunkHeader`], handed to a publisher for in-place payload
//! construction, and travels by reference: every queue, history slot, or
//! subscriber holds a [`SharedChunk`] against the header's count. The last
//! holder returns the chunk to its pool.

mod header;
mod layout;
mod shared;

pub use header::ChunkHeader;
pub use layout::{
    ChunkLayout, CHUNK_MEMORY_ALIGNMENT, DEFAULT_USER_PAYLOAD_ALIGNMENT, NO_USER_HEADER_ALIGNMENT,
    NO_USER_HEADER_SIZE,
};
pub use shared::SharedChunk;

pub(crate) use layout::align_up;
