//! Bounded lock-free chunk ring with safe overflow.

use crate::chunk::{ChunkHeader, SharedChunk};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicPtr, AtomicU64, Ordering};

/// A bounded ring of chunk references with a safe-overflow push.
///
/// Slots are single `AtomicPtr` words (a [`SharedChunk`] dissolves into
/// its header pointer on entry and reassembles on exit), so no slot is
/// ever read or written torn. The cursors are monotonically increasing
/// `u64`s; a slot's position is `cursor % capacity`.
///
/// Concurrency contract: one producer at a time (the queue layer
/// serializes producers in its multi-producer variant) and one consumer.
/// The only point of contention is a full ring, where the producer evicts
/// the oldest element by claiming the read cursor with the same
/// compare-and-swap the consumer uses. Whoever wins owns that slot, so
/// the push path stays wait-free apart from that single bounded race.
pub(crate) struct OverflowRing {
    slots: Box<[AtomicPtr<ChunkHeader>]>,
    read: AtomicU64,
    write: AtomicU64,
    capacity: usize,
}

impl OverflowRing {
    pub(crate) fn new(capacity: usize) -> Self {
        debug_assert!(capacity > 0);
        let slots = (0..capacity)
            .map(|_| AtomicPtr::new(std::ptr::null_mut()))
            .collect();
        Self {
            slots,
            read: AtomicU64::new(0),
            write: AtomicU64::new(0),
            capacity,
        }
    }

    /// Append `chunk`; when full, evict and return the oldest element.
    pub(crate) fn overflow_push(&self, chunk: SharedChunk) -> Option<SharedChunk> {
        let write = self.write.load(Ordering::Relaxed);
        let read = self.read.load(Ordering::Acquire);

        let mut evicted = None;
        if write - read >= self.capacity as u64 {
            // Full: claim the oldest slot. Losing the race means the
            // consumer just popped it and space exists anyway.
            if self
                .read
                .compare_exchange(read, read + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                evicted = Some(self.take_slot(read));
            }
        }

        self.store_slot(write, chunk);
        self.write.store(write + 1, Ordering::Release);
        evicted
    }

    /// Append `chunk`, or hand it back when the ring is full.
    pub(crate) fn try_push(&self, chunk: SharedChunk) -> Result<(), SharedChunk> {
        let write = self.write.load(Ordering::Relaxed);
        let read = self.read.load(Ordering::Acquire);
        if write - read >= self.capacity as u64 {
            return Err(chunk);
        }

        self.store_slot(write, chunk);
        self.write.store(write + 1, Ordering::Release);
        Ok(())
    }

    /// Pop the oldest element.
    pub(crate) fn pop(&self) -> Option<SharedChunk> {
        loop {
            let read = self.read.load(Ordering::Acquire);
            let write = self.write.load(Ordering::Acquire);
            if read == write {
                return None;
            }

            if self
                .read
                .compare_exchange(read, read + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Some(self.take_slot(read));
            }
            // Lost the claim to an overflowing producer; retry.
            std::hint::spin_loop();
        }
    }

    /// Number of elements currently queued.
    pub(crate) fn len(&self) -> usize {
        let read = self.read.load(Ordering::Acquire);
        let write = self.write.load(Ordering::Acquire);
        write.saturating_sub(read) as usize
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    /// Take ownership of the element at `position`; the claim CAS on the
    /// read cursor made this slot exclusively ours.
    fn take_slot(&self, position: u64) -> SharedChunk {
        let slot = &self.slots[(position % self.capacity as u64) as usize];
        let raw = slot.swap(std::ptr::null_mut(), Ordering::AcqRel);
        debug_assert!(!raw.is_null());
        // SAFETY: every claimed position holds the pointer its producer
        // published before bumping the write cursor.
        unsafe { SharedChunk::from_raw(NonNull::new_unchecked(raw)) }
    }

    /// Publish `chunk` into the slot at `position`.
    ///
    /// The slot's previous occupant was claimed by a pop or an eviction;
    /// its swap-to-null may still be in flight, so spin until the slot is
    /// actually empty instead of clobbering it.
    fn store_slot(&self, position: u64, chunk: SharedChunk) {
        let raw = chunk.into_raw().as_ptr();
        let slot = &self.slots[(position % self.capacity as u64) as usize];
        loop {
            if slot
                .compare_exchange_weak(
                    std::ptr::null_mut(),
                    raw,
                    Ordering::Release,
                    Ordering::Relaxed,
                )
                .is_ok()
            {
                return;
            }
            std::hint::spin_loop();
        }
    }
}

impl Drop for OverflowRing {
    fn drop(&mut self) {
        // Release the reference each queued chunk still holds.
        while self.pop().is_some() {}
    }
}

// SAFETY: slots and cursors are atomics; element ownership transfers
// through the claim CAS.
unsafe impl Send for OverflowRing {}
unsafe impl Sync for OverflowRing {}
