//! Chunk fan-out to subscriber queues.

use super::queue::{ChunkQueueData, PushOutcome};
use crate::chunk::SharedChunk;
use crate::config::SubscriberTooSlowPolicy;
use crate::error::DistributorError;
use crate::fault::{self, FaultKind, Severity};
use smallvec::SmallVec;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

/// Queue references kept inline before spilling; most publishers serve a
/// handful of subscribers.
const INLINE_QUEUES: usize = 8;

/// Fan-out state: the registered subscriber queues and the history ring.
///
/// Both live behind one mutex so a queue joining while a chunk is being
/// sent sees a consistent cut: it receives the full history including
/// that chunk, or the chunk arrives live, never both and never neither.
pub struct ChunkDistributorData<'q> {
    state: Mutex<DistributorState<'q>>,
    subscriber_too_slow_policy: SubscriberTooSlowPolicy,
    history_capacity: usize,
    max_queues: usize,
}

struct DistributorState<'q> {
    queues: SmallVec<[&'q ChunkQueueData; INLINE_QUEUES]>,
    history: VecDeque<SharedChunk>,
}

impl<'q> ChunkDistributorData<'q> {
    /// Create fan-out state for up to `max_queues` subscriber queues and
    /// `history_capacity` retained chunks.
    pub fn new(
        subscriber_too_slow_policy: SubscriberTooSlowPolicy,
        history_capacity: usize,
        max_queues: usize,
    ) -> Self {
        Self {
            state: Mutex::new(DistributorState {
                queues: SmallVec::new(),
                history: VecDeque::with_capacity(history_capacity),
            }),
            subscriber_too_slow_policy,
            history_capacity,
            max_queues,
        }
    }
}

/// Operations on a [`ChunkDistributorData`].
pub struct ChunkDistributor<'a, 'q> {
    data: &'a ChunkDistributorData<'q>,
}

impl<'a, 'q> ChunkDistributor<'a, 'q> {
    /// Attach to `data`.
    pub fn new(data: &'a ChunkDistributorData<'q>) -> Self {
        Self { data }
    }

    /// Register `queue` for future deliveries and catch it up with the
    /// last `min(history_request, history length)` sent chunks, oldest
    /// first.
    ///
    /// Adding a queue that is already registered is a no-op. A full queue
    /// container reports [`FaultKind::QueueContainerOverflow`] and returns
    /// the matching error.
    pub fn try_add_queue(
        &self,
        queue: &'q ChunkQueueData,
        history_request: usize,
    ) -> Result<(), DistributorError> {
        let mut state = self.lock_state();
        if state.queues.iter().any(|known| std::ptr::eq(*known, queue)) {
            return Ok(());
        }
        if state.queues.len() >= self.data.max_queues {
            fault::report(FaultKind::QueueContainerOverflow, Severity::Moderate);
            return Err(DistributorError::QueueContainerOverflow);
        }
        state.queues.push(queue);

        let catch_up = history_request.min(state.history.len());
        for chunk in state.history.iter().skip(state.history.len() - catch_up) {
            // Catch-up is best effort: a queue that cannot even take the
            // history it asked for loses the excess.
            match queue.try_push(chunk.clone()) {
                PushOutcome::Pushed => {}
                PushOutcome::Discarded(evicted) => drop(evicted),
                PushOutcome::Full(chunk) => {
                    tracing::debug!("dropping history chunk for a full subscriber queue");
                    drop(chunk);
                }
            }
        }
        Ok(())
    }

    /// Deregister `queue`; unblocks a producer currently waiting on it.
    pub fn remove_queue(&self, queue: &ChunkQueueData) {
        let mut state = self.lock_state();
        state.queues.retain(|known| !std::ptr::eq(*known, queue));
        drop(state);
        queue.notify_space();
    }

    /// Whether `queue` is currently registered.
    pub fn has_queue(&self, queue: &ChunkQueueData) -> bool {
        self.lock_state()
            .queues
            .iter()
            .any(|known| std::ptr::eq(*known, queue))
    }

    /// Number of registered subscriber queues.
    pub fn queue_count(&self) -> usize {
        self.lock_state().queues.len()
    }

    /// Append `chunk` to the history (evicting the oldest entry when
    /// full) and push a reference into every registered queue.
    ///
    /// Returns the number of queues that accepted the chunk.
    pub fn deliver_to_all_stored_queues(&self, chunk: SharedChunk) -> usize {
        let snapshot: SmallVec<[&'q ChunkQueueData; INLINE_QUEUES]> = {
            let mut state = self.lock_state();
            push_history(&mut state.history, self.data.history_capacity, chunk.clone());
            state.queues.clone()
        };

        let mut delivered = 0;
        for queue in snapshot {
            if self.deliver_to_queue(queue, chunk.clone()) {
                delivered += 1;
            }
        }
        delivered
    }

    /// Append `chunk` to the history without delivering it anywhere.
    pub fn add_to_history_without_delivery(&self, chunk: SharedChunk) {
        let mut state = self.lock_state();
        push_history(&mut state.history, self.data.history_capacity, chunk);
    }

    /// Number of chunks currently retained in the history.
    pub fn history_len(&self) -> usize {
        self.lock_state().history.len()
    }

    /// Drop every retained history chunk.
    pub fn clear_history(&self) {
        self.lock_state().history.clear();
    }

    /// Push one chunk into one queue under the subscriber-too-slow policy.
    ///
    /// Blocking waits are bounded slices with a registration recheck, so
    /// removing the queue frees a stuck producer.
    fn deliver_to_queue(&self, queue: &'q ChunkQueueData, chunk: SharedChunk) -> bool {
        let mut pending = chunk;
        loop {
            match queue.try_push(pending) {
                PushOutcome::Pushed => return true,
                PushOutcome::Discarded(evicted) => {
                    drop(evicted);
                    return true;
                }
                PushOutcome::Full(chunk) => match self.data.subscriber_too_slow_policy {
                    SubscriberTooSlowPolicy::DiscardOldestData => {
                        tracing::debug!("subscriber queue full, delivery lost");
                        return false;
                    }
                    SubscriberTooSlowPolicy::WaitForSubscriber => {
                        if !self.has_queue(queue) {
                            return false;
                        }
                        queue.wait_for_space();
                        pending = chunk;
                    }
                },
            }
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, DistributorState<'q>> {
        self.data
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn push_history(history: &mut VecDeque<SharedChunk>, capacity: usize, chunk: SharedChunk) {
    if capacity == 0 {
        return;
    }
    if history.len() == capacity {
        history.pop_front();
    }
    history.push_back(chunk);
}
