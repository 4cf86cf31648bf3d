//! Error types for Zenith.

use thiserror::Error;

/// Result type alias using Zenith's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for construction and configuration operations.
#[derive(Error, Debug)]
pub enum Error {
    /// A configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The backing byte range could not satisfy a carve-out request.
    #[error("memory allocation failed: {0}")]
    AllocationFailed(String),
}

/// Typed failures returned by `ChunkSender::try_allocate` and
/// `MemoryManager::get_chunk`.
///
/// These are recoverable at the API level: the caller decides whether to
/// retry later, back off, or surface the condition.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationError {
    /// No configured memory pool has chunks large enough for the request.
    #[error("no memory pool can hold the requested chunk size")]
    NoMempoolsAvailable,

    /// The selected memory pool has no free chunks left.
    #[error("the selected memory pool is out of chunks")]
    RunningOutOfChunks,

    /// The publisher already holds `max_in_flight` unsent chunks.
    #[error("too many chunks allocated in parallel")]
    TooManyChunksAllocatedInParallel,

    /// The requested payload or user-header parameters are invalid.
    #[error("invalid chunk parameters: {0}")]
    InvalidChunkParameters(#[from] LayoutError),
}

/// Failures of the chunk layout computation.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutError {
    /// The user payload alignment is not a power of two.
    #[error("user payload alignment is not a power of two")]
    PayloadAlignmentNotPowerOfTwo,

    /// The user header alignment is not a power of two.
    #[error("user header alignment is not a power of two")]
    UserHeaderAlignmentNotPowerOfTwo,

    /// A user header alignment was given without a user header.
    #[error("user header alignment given for a zero-sized user header")]
    UserHeaderAlignmentWithoutUserHeader,

    /// The computed chunk size overflows the address space.
    #[error("required chunk size overflows")]
    RequiredSizeOverflow,
}

/// Failures of subscriber queue registration at the distributor.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistributorError {
    /// The distributor already holds `max_queues` subscriber queues.
    #[error("subscriber queue container is full")]
    QueueContainerOverflow,
}
