//! # Zenith
//!
//! The publisher side of a zero-copy, shared-memory publish/subscribe
//! transport.
//!
//! Zenith manages fixed-size memory chunks end to end: a publisher
//! allocates a chunk from a segmented pool, constructs its payload in
//! place, and sends it. The chunk travels to subscriber queues by
//! reference, is optionally retained as history for late joiners, and
//! returns to its pool the moment the last holder lets go.
//!
//! ## Building blocks
//!
//! - **Memory**: [`mem::MemoryManager`] routes allocations to the
//!   smallest sufficient [`mem::MemPool`], all carved from one flat byte
//!   range the caller provides (a mapped shared-memory segment, a static
//!   buffer, anything)
//! - **Chunks**: [`chunk::ChunkHeader`] is the in-band metadata prefix;
//!   [`chunk::SharedChunk`] is the reference-counted handle
//! - **Transport**: [`transport::ChunkSender`] drives the publisher state
//!   machine, fanning chunks out through a
//!   [`transport::ChunkDistributor`] into bounded
//!   [`transport::ChunkQueueData`] rings drained by
//!   [`transport::ChunkQueuePopper`]s
//!
//! ## Quick start
//!
//! ```rust
//! use std::ptr::NonNull;
//! use zenith::prelude::*;
//!
//! // One megabyte of backing memory; two pools.
//! let mut config = MemPoolConfig::new();
//! config.add_pool(128, 20).add_pool(1024, 8);
//! let mut memory = vec![0u8; MemoryManager::required_memory_size(&config)];
//! let base = NonNull::new(memory.as_mut_ptr()).unwrap();
//! // SAFETY: `memory` outlives the manager and everything built on it.
//! let mut allocator = unsafe { BumpAllocator::new(base, memory.len()) };
//! let manager = MemoryManager::new(&config, &mut allocator).unwrap();
//!
//! // A subscriber queue and a publisher.
//! let queue = ChunkQueueData::new(ChunkQueueConfig::default()).unwrap();
//! let sender_data = ChunkSenderData::new(manager, &ChunkSenderConfig::default()).unwrap();
//! let sender = ChunkSender::new(&sender_data);
//! sender.try_add_queue(&queue, 0).unwrap();
//!
//! // Publish one chunk.
//! let header = sender.try_allocate(UniquePortId::new(), 8, 8, 0, 1).unwrap();
//! // SAFETY: the payload region is exclusively ours until `send`.
//! unsafe { header.as_ref().user_payload().cast::<u64>().write(42) };
//! sender.send(header);
//!
//! // Consume it.
//! let popper = ChunkQueuePopper::new(&queue);
//! let chunk = popper.try_pop().unwrap();
//! assert_eq!(chunk.payload()[0], 42);
//! ```
//!
//! ## Concurrency model
//!
//! Plain OS threads, no async runtime. Pool freelists and queue rings are
//! lock-free; blocking exists only where configured
//! ([`config::QueueFullPolicy::BlockProducer`],
//! [`config::SubscriberTooSlowPolicy::WaitForSubscriber`]). Ordering is
//! FIFO per publisher and total per queue; publishers are not ordered
//! against each other.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod chunk;
pub mod config;
pub mod error;
pub mod fault;
pub mod mem;
pub mod port;
pub mod transport;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::chunk::{ChunkHeader, SharedChunk};
    pub use crate::config::{
        ChunkQueueConfig, ChunkSenderConfig, MemPoolConfig, QueueFullPolicy, QueueVariant,
        SubscriberTooSlowPolicy,
    };
    pub use crate::error::{AllocationError, Error, Result};
    pub use crate::mem::{BumpAllocator, MemoryManager};
    pub use crate::port::UniquePortId;
    pub use crate::transport::{
        ChunkQueueData, ChunkQueuePopper, ChunkQueuePusher, ChunkSender, ChunkSenderData,
    };
}

pub use error::{Error, Result};
