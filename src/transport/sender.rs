//! Publisher-side chunk lifecycle management.

use super::distributor::{ChunkDistributor, ChunkDistributorData};
use super::queue::ChunkQueueData;
use crate::chunk::{ChunkHeader, ChunkLayout, SharedChunk};
use crate::config::ChunkSenderConfig;
use crate::error::{AllocationError, DistributorError, Result};
use crate::fault::{self, FaultKind, Severity};
use crate::mem::MemoryManager;
use crate::port::UniquePortId;
use std::ptr::NonNull;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Publisher state: the in-flight table, the last sent chunk, and the
/// sequence counter, layered over the fan-out state.
///
/// A chunk is *in flight* from `try_allocate` until it is sent, released,
/// or pushed to history. The table is a fixed slot array sized
/// `max_in_flight` at construction; occupancy is simply which slots hold
/// a chunk, so the allocation fast path touches no growable container.
pub struct ChunkSenderData<'q> {
    distributor: ChunkDistributorData<'q>,
    state: Mutex<SenderState>,
    manager: MemoryManager,
}

struct SenderState {
    in_flight: Box<[Option<SharedChunk>]>,
    last_sent: Option<SharedChunk>,
    next_sequence_number: u64,
}

impl<'q> ChunkSenderData<'q> {
    /// Create publisher state allocating from `manager`, configured by
    /// `config`.
    pub fn new(manager: MemoryManager, config: &ChunkSenderConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            distributor: ChunkDistributorData::new(
                config.subscriber_too_slow_policy,
                config.history_capacity,
                config.max_queues,
            ),
            state: Mutex::new(SenderState {
                in_flight: (0..config.max_in_flight).map(|_| None).collect(),
                last_sent: None,
                next_sequence_number: 0,
            }),
            manager,
        })
    }
}

/// Operations on a [`ChunkSenderData`]: the publisher's chunk state
/// machine.
///
/// Every in-flight slot follows one path:
///
/// ```text
/// Empty ──try_allocate──> Held ──send────────────> Empty (chunk fanned out)
///                          │ ────release─────────> Empty (chunk reclaimed)
///                          └ ────push_to_history─> Empty (chunk retained)
/// ```
///
/// Handing the sender a header it does not hold is reported to the fault
/// handler and changes nothing.
///
/// # Example
///
/// ```rust,ignore
/// let sender = ChunkSender::new(&sender_data);
/// let header = sender.try_allocate(port_id, 1024, 8, 0, 1)?;
/// // construct the payload in place ...
/// sender.send(header);
/// ```
pub struct ChunkSender<'a, 'q> {
    data: &'a ChunkSenderData<'q>,
}

impl<'a, 'q> ChunkSender<'a, 'q> {
    /// Attach to `data`.
    pub fn new(data: &'a ChunkSenderData<'q>) -> Self {
        Self { data }
    }

    /// Register a subscriber queue, catching it up with
    /// `history_request` retained chunks (oldest first).
    pub fn try_add_queue(
        &self,
        queue: &'q ChunkQueueData,
        history_request: usize,
    ) -> std::result::Result<(), DistributorError> {
        self.distributor().try_add_queue(queue, history_request)
    }

    /// Deregister a subscriber queue.
    pub fn remove_queue(&self, queue: &ChunkQueueData) {
        self.distributor().remove_queue(queue)
    }

    /// Allocate a chunk for in-place payload construction.
    ///
    /// The previously sent chunk is recycled instead when the sender is
    /// its only remaining holder and its capacity admits the requested
    /// layout, the hot path for a publisher whose subscribers keep up.
    ///
    /// Returns the chunk's header; the payload region behind it is
    /// exclusively the caller's until the chunk is sent, released, or
    /// pushed to history.
    pub fn try_allocate(
        &self,
        origin_id: UniquePortId,
        user_payload_size: u32,
        user_payload_alignment: u32,
        user_header_size: u32,
        user_header_alignment: u32,
    ) -> std::result::Result<NonNull<ChunkHeader>, AllocationError> {
        let layout = ChunkLayout::compute(
            user_payload_size,
            user_payload_alignment,
            user_header_size,
            user_header_alignment,
        )?;

        let mut state = self.lock_state();
        let free_slot = state
            .in_flight
            .iter()
            .position(Option::is_none)
            .ok_or(AllocationError::TooManyChunksAllocatedInParallel)?;

        // Recycle the last sent chunk when nothing else references it.
        // The count can only grow through a holder, so observing one
        // means the sender's handle is the sole owner.
        let reusable = state
            .last_sent
            .as_ref()
            .is_some_and(|last| last.ref_count() == 1 && last.header().fits(&layout));
        if reusable {
            if let Some(chunk) = state.last_sent.take() {
                let mut header = chunk.header_ptr();
                // SAFETY: sole holder, so the header is exclusively ours.
                unsafe { header.as_mut().restamp(origin_id, &layout) };
                state.in_flight[free_slot] = Some(chunk);
                return Ok(header);
            }
        }

        let chunk = self
            .data
            .manager
            .get_chunk_with_layout(origin_id, &layout)?;
        let header = chunk.header_ptr();
        state.in_flight[free_slot] = Some(chunk);
        Ok(header)
    }

    /// Give back an allocated chunk without sending it.
    pub fn release(&self, header: NonNull<ChunkHeader>) {
        let mut state = self.lock_state();
        match take_in_flight(&mut state, header) {
            Some(chunk) => drop(chunk),
            None => fault::report(FaultKind::SenderInvalidChunkToFree, Severity::Moderate),
        }
    }

    /// Send an allocated chunk: stamp its sequence number, retain it in
    /// the history, fan it out to every subscriber queue, and remember it
    /// for reuse.
    pub fn send(&self, header: NonNull<ChunkHeader>) {
        let mut state = self.lock_state();
        let Some(chunk) = take_in_flight(&mut state, header) else {
            fault::report(FaultKind::SenderInvalidChunkToSend, Severity::Moderate);
            return;
        };

        let sequence_number = state.next_sequence_number;
        state.next_sequence_number += 1;
        let mut header = chunk.header_ptr();
        // SAFETY: the chunk left the in-flight table unsent, so no queue
        // or history slot references it yet.
        unsafe { header.as_mut().set_sequence_number(sequence_number) };

        self.distributor().deliver_to_all_stored_queues(chunk.clone());
        state.last_sent = Some(chunk);
    }

    /// Retain an allocated chunk in the history without delivering it.
    pub fn push_to_history(&self, header: NonNull<ChunkHeader>) {
        let mut state = self.lock_state();
        let Some(chunk) = take_in_flight(&mut state, header) else {
            fault::report(
                FaultKind::SenderInvalidChunkToPushToHistory,
                Severity::Moderate,
            );
            return;
        };
        self.distributor().add_to_history_without_delivery(chunk);
    }

    /// The last sent chunk's header, while the sender still retains it.
    pub fn try_get_previous_chunk(&self) -> Option<NonNull<ChunkHeader>> {
        self.lock_state()
            .last_sent
            .as_ref()
            .map(SharedChunk::header_ptr)
    }

    /// Drop everything the sender holds: in-flight chunks, the last sent
    /// chunk, and the history. Used at publisher teardown.
    pub fn release_all(&self) {
        let mut state = self.lock_state();
        for slot in state.in_flight.iter_mut() {
            *slot = None;
        }
        state.last_sent = None;
        self.distributor().clear_history();
    }

    fn distributor(&self) -> ChunkDistributor<'a, 'q> {
        ChunkDistributor::new(&self.data.distributor)
    }

    fn lock_state(&self) -> MutexGuard<'a, SenderState> {
        self.data
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Remove and return the in-flight entry for `header`, if the sender
/// holds it.
fn take_in_flight(state: &mut SenderState, header: NonNull<ChunkHeader>) -> Option<SharedChunk> {
    state
        .in_flight
        .iter_mut()
        .find(|slot| {
            slot.as_ref()
                .is_some_and(|chunk| chunk.header_ptr() == header)
        })
        .and_then(Option::take)
}
