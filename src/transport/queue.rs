//! Bounded subscriber queues of chunk references.

use super::ring::OverflowRing;
use crate::chunk::SharedChunk;
use crate::config::{ChunkQueueConfig, QueueFullPolicy, QueueVariant};
use crate::error::Result;
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;

/// How long a blocked producer sleeps between full-queue rechecks.
const SPACE_WAIT_SLICE: Duration = Duration::from_millis(1);

/// Outcome of a single push attempt.
#[derive(Debug)]
pub enum PushOutcome {
    /// The chunk was queued.
    Pushed,
    /// The queue was full; the oldest chunk was evicted to make room and
    /// is handed to the caller for inspection or release.
    Discarded(SharedChunk),
    /// The queue was full and refuses eviction (`BlockProducer`); the
    /// chunk is handed back so the caller can wait and retry.
    Full(SharedChunk),
}

/// Transport state of one subscriber queue.
///
/// The queue is a fixed-capacity FIFO of [`SharedChunk`] references with a
/// construction-time overflow policy and producer-concurrency variant. The
/// single-producer variant pushes and pops without taking any lock; the
/// multi-producer variant serializes pushers with an internal mutex. The
/// consumer side is always a single [`ChunkQueuePopper`].
pub struct ChunkQueueData {
    ring: OverflowRing,
    full_policy: QueueFullPolicy,
    variant: QueueVariant,
    producer_lock: Mutex<()>,
    wait_lock: Mutex<()>,
    space_freed: Condvar,
}

impl ChunkQueueData {
    /// Create a queue from a validated configuration.
    pub fn new(config: ChunkQueueConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            ring: OverflowRing::new(config.capacity),
            full_policy: config.full_policy,
            variant: config.variant,
            producer_lock: Mutex::new(()),
            wait_lock: Mutex::new(()),
            space_freed: Condvar::new(),
        })
    }

    /// One policy-aware push attempt.
    pub(crate) fn try_push(&self, chunk: SharedChunk) -> PushOutcome {
        let _serialized = match self.variant {
            QueueVariant::SingleProducerSingleConsumer => None,
            QueueVariant::MultiProducerSingleConsumer => {
                Some(self.producer_lock.lock().unwrap_or_else(PoisonError::into_inner))
            }
        };

        match self.full_policy {
            QueueFullPolicy::DiscardOldestData => match self.ring.overflow_push(chunk) {
                Some(evicted) => PushOutcome::Discarded(evicted),
                None => PushOutcome::Pushed,
            },
            QueueFullPolicy::BlockProducer => match self.ring.try_push(chunk) {
                Ok(()) => PushOutcome::Pushed,
                Err(chunk) => PushOutcome::Full(chunk),
            },
        }
    }

    /// Pop the oldest chunk, waking any producer blocked on a full queue.
    pub(crate) fn pop(&self) -> Option<SharedChunk> {
        let chunk = self.ring.pop()?;
        if self.full_policy == QueueFullPolicy::BlockProducer {
            self.notify_space();
        }
        Some(chunk)
    }

    /// Park the caller until space may be available.
    ///
    /// Bounded by [`SPACE_WAIT_SLICE`] so producers re-examine the queue
    /// (and their own cancellation conditions) even on a missed wakeup.
    pub(crate) fn wait_for_space(&self) {
        let guard = self.wait_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = self
            .space_freed
            .wait_timeout(guard, SPACE_WAIT_SLICE)
            .unwrap_or_else(PoisonError::into_inner);
    }

    /// Wake every producer parked in [`ChunkQueueData::wait_for_space`].
    pub(crate) fn notify_space(&self) {
        drop(self.wait_lock.lock().unwrap_or_else(PoisonError::into_inner));
        self.space_freed.notify_all();
    }

    /// Number of chunks currently queued.
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Whether the queue holds no chunks.
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Fixed capacity chosen at construction.
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    /// The queue's overflow policy.
    pub fn full_policy(&self) -> QueueFullPolicy {
        self.full_policy
    }
}

/// Producer-side handle to a [`ChunkQueueData`].
pub struct ChunkQueuePusher<'a> {
    queue: &'a ChunkQueueData,
}

impl<'a> ChunkQueuePusher<'a> {
    /// Attach a pusher to `queue`.
    pub fn new(queue: &'a ChunkQueueData) -> Self {
        Self { queue }
    }

    /// One push attempt; never blocks.
    pub fn try_push(&self, chunk: SharedChunk) -> PushOutcome {
        self.queue.try_push(chunk)
    }

    /// Push `chunk`, blocking while a `BlockProducer` queue stays full.
    pub fn push(&self, chunk: SharedChunk) -> Option<SharedChunk> {
        let mut pending = chunk;
        loop {
            match self.queue.try_push(pending) {
                PushOutcome::Pushed => return None,
                PushOutcome::Discarded(evicted) => return Some(evicted),
                PushOutcome::Full(chunk) => {
                    pending = chunk;
                    self.queue.wait_for_space();
                }
            }
        }
    }
}

/// Consumer-side handle to a [`ChunkQueueData`]; one per queue.
pub struct ChunkQueuePopper<'a> {
    queue: &'a ChunkQueueData,
}

impl<'a> ChunkQueuePopper<'a> {
    /// Attach the popper to `queue`.
    pub fn new(queue: &'a ChunkQueueData) -> Self {
        Self { queue }
    }

    /// Pop the oldest chunk; `None` when the queue is empty.
    pub fn try_pop(&self) -> Option<SharedChunk> {
        self.queue.pop()
    }

    /// Whether the queue holds no chunks.
    pub fn empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Number of chunks currently queued.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Fixed capacity chosen at construction.
    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Drop every queued chunk, releasing the references they hold.
    pub fn clear(&self) {
        while self.try_pop().is_some() {}
    }
}
