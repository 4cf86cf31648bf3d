//! Construction-time configuration for pools, queues, and senders.
//!
//! All configuration is validated once, up front. The hot paths never
//! consult anything but plain fields captured at construction.

use crate::error::{Error, Result};

/// Upper bound for a sender's history capacity.
pub const MAX_PUBLISHER_HISTORY: usize = 16;

/// Upper bound for a sender's simultaneously allocated chunks.
pub const MAX_IN_FLIGHT_LIMIT: usize = 32;

/// Upper bound for subscriber queues attached to one distributor.
pub const MAX_SUBSCRIBER_QUEUES: usize = 128;

/// One fixed-chunk-size pool: `chunk_count` chunks of `chunk_size` bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemPoolEntry {
    /// User-visible capacity of each chunk in this pool. The pool itself
    /// allocates `chunk_size` plus the chunk header overhead per chunk.
    pub chunk_size: u32,
    /// Number of chunks in this pool.
    pub chunk_count: u32,
}

/// Ordered set of memory pools for a [`MemoryManager`](crate::mem::MemoryManager).
///
/// Entries must be strictly ascending in `chunk_size`; [`MemPoolConfig::validate`]
/// enforces this together with the per-entry constraints.
///
/// # Example
///
/// ```rust
/// use zenith::config::MemPoolConfig;
///
/// let mut config = MemPoolConfig::new();
/// config.add_pool(128, 20);
/// config.add_pool(256, 20);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemPoolConfig {
    entries: Vec<MemPoolEntry>,
}

impl MemPoolConfig {
    /// Create an empty pool configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a pool of `chunk_count` chunks of `chunk_size` bytes.
    pub fn add_pool(&mut self, chunk_size: u32, chunk_count: u32) -> &mut Self {
        self.entries.push(MemPoolEntry {
            chunk_size,
            chunk_count,
        });
        self
    }

    /// The configured pool entries, in configuration order.
    pub fn entries(&self) -> &[MemPoolEntry] {
        &self.entries
    }

    /// Validate the configuration.
    ///
    /// Checks that at least one pool is configured, sizes are non-zero,
    /// strictly ascending and multiples of the chunk alignment, and chunk
    /// counts are non-zero.
    pub fn validate(&self) -> Result<()> {
        if self.entries.is_empty() {
            return Err(Error::InvalidConfig("no memory pools configured".into()));
        }

        let align = crate::chunk::CHUNK_MEMORY_ALIGNMENT as u32;

        let mut previous_size = 0u32;
        for entry in &self.entries {
            if entry.chunk_count == 0 {
                return Err(Error::InvalidConfig(format!(
                    "pool with chunk size {} has zero chunks",
                    entry.chunk_size
                )));
            }
            if entry.chunk_size == 0 || entry.chunk_size % align != 0 {
                return Err(Error::InvalidConfig(format!(
                    "chunk size {} is not a multiple of the chunk alignment ({})",
                    entry.chunk_size, align
                )));
            }
            if entry.chunk_size <= previous_size {
                return Err(Error::InvalidConfig(
                    "pool chunk sizes must be strictly ascending".into(),
                ));
            }
            previous_size = entry.chunk_size;
        }

        Ok(())
    }
}

/// Behavior of a queue when a push finds it full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueueFullPolicy {
    /// Evict the oldest queued chunk to make room for the new one.
    #[default]
    DiscardOldestData,
    /// Refuse the push; the producer decides whether to block.
    BlockProducer,
}

/// Behavior of a sender when a subscriber queue cannot take a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubscriberTooSlowPolicy {
    /// Let the queue evict its oldest chunk (or lose the delivery).
    #[default]
    DiscardOldestData,
    /// Block the sending thread until the queue has space or is removed.
    WaitForSubscriber,
}

/// Producer-side concurrency variant of a chunk queue.
///
/// The consumer side is always a single popper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueueVariant {
    /// Exactly one producer; pushes are wait-free.
    #[default]
    SingleProducerSingleConsumer,
    /// Multiple producers serialized by an internal mutex.
    MultiProducerSingleConsumer,
}

/// Construction configuration for a [`ChunkQueueData`](crate::transport::ChunkQueueData).
#[derive(Debug, Clone, Copy)]
pub struct ChunkQueueConfig {
    /// Maximum number of chunks the queue holds.
    pub capacity: usize,
    /// What a push does when the queue is full.
    pub full_policy: QueueFullPolicy,
    /// Producer-side concurrency variant.
    pub variant: QueueVariant,
}

impl Default for ChunkQueueConfig {
    fn default() -> Self {
        Self {
            capacity: 256,
            full_policy: QueueFullPolicy::default(),
            variant: QueueVariant::default(),
        }
    }
}

impl ChunkQueueConfig {
    /// Validate the configuration: the capacity must be non-zero.
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(Error::InvalidConfig("queue capacity must be > 0".into()));
        }
        Ok(())
    }
}

/// Construction configuration for a [`ChunkSenderData`](crate::transport::ChunkSenderData).
#[derive(Debug, Clone, Copy)]
pub struct ChunkSenderConfig {
    /// Policy applied per subscriber queue when it cannot take a chunk.
    pub subscriber_too_slow_policy: SubscriberTooSlowPolicy,
    /// Number of recently sent chunks retained for late subscribers.
    pub history_capacity: usize,
    /// Maximum number of chunks the publisher may hold unsent at once.
    pub max_in_flight: usize,
    /// Maximum number of subscriber queues.
    pub max_queues: usize,
}

impl Default for ChunkSenderConfig {
    fn default() -> Self {
        Self {
            subscriber_too_slow_policy: SubscriberTooSlowPolicy::default(),
            history_capacity: 0,
            max_in_flight: 8,
            max_queues: MAX_SUBSCRIBER_QUEUES,
        }
    }
}

impl ChunkSenderConfig {
    /// Validate the configuration against the compile-time limits.
    pub fn validate(&self) -> Result<()> {
        if self.history_capacity > MAX_PUBLISHER_HISTORY {
            return Err(Error::InvalidConfig(format!(
                "history capacity {} exceeds the limit of {}",
                self.history_capacity, MAX_PUBLISHER_HISTORY
            )));
        }
        if self.max_in_flight == 0 || self.max_in_flight > MAX_IN_FLIGHT_LIMIT {
            return Err(Error::InvalidConfig(format!(
                "max in-flight chunks must be in 1..={}",
                MAX_IN_FLIGHT_LIMIT
            )));
        }
        if self.max_queues == 0 || self.max_queues > MAX_SUBSCRIBER_QUEUES {
            return Err(Error::InvalidConfig(format!(
                "max queues must be in 1..={}",
                MAX_SUBSCRIBER_QUEUES
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mempool_config_valid() {
        let mut config = MemPoolConfig::new();
        config.add_pool(128, 20).add_pool(256, 20);
        assert!(config.validate().is_ok());
        assert_eq!(config.entries().len(), 2);
    }

    #[test]
    fn test_mempool_config_rejects_empty() {
        assert!(MemPoolConfig::new().validate().is_err());
    }

    #[test]
    fn test_mempool_config_rejects_descending() {
        let mut config = MemPoolConfig::new();
        config.add_pool(256, 20).add_pool(128, 20);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_mempool_config_rejects_duplicate_sizes() {
        let mut config = MemPoolConfig::new();
        config.add_pool(128, 20).add_pool(128, 10);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_mempool_config_rejects_zero_count() {
        let mut config = MemPoolConfig::new();
        config.add_pool(128, 0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_mempool_config_rejects_misaligned_size() {
        let mut config = MemPoolConfig::new();
        config.add_pool(130, 20);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_sender_config_limits() {
        let config = ChunkSenderConfig {
            history_capacity: MAX_PUBLISHER_HISTORY + 1,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ChunkSenderConfig {
            max_in_flight: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        assert!(ChunkSenderConfig::default().validate().is_ok());
    }

    #[test]
    fn test_queue_config_rejects_zero_capacity() {
        let config = ChunkQueueConfig {
            capacity: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
