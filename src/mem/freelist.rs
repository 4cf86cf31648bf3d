//! Lock-free index freelist.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Index terminating the freelist.
const INVALID_INDEX: u32 = u32::MAX;

/// Marker stored in a popped entry's link; guards against double frees.
const CLAIMED: u32 = u32::MAX - 1;

/// A lock-free stack of slot indices.
///
/// The stack state is a single packed `head` word plus an external `next`
/// link table (one `AtomicU32` per slot, carved next to the slots it
/// indexes). The head packs a generation counter next to the top index,
/// so the compare-and-swap loops are ABA-safe: every successful push or
/// pop bumps the generation, and a stale head never exchanges.
///
/// A popped entry's link is overwritten with a claim marker. Pushing an
/// index whose link does not carry the marker is a double free; the push
/// is refused and the caller reports it.
#[repr(C)]
pub(crate) struct IndexFreeList {
    head: AtomicU64,
}

impl IndexFreeList {
    /// An empty stack; [`IndexFreeList::init`] links it up.
    pub(crate) fn new() -> Self {
        Self {
            head: AtomicU64::new(pack(0, INVALID_INDEX)),
        }
    }

    /// Link all of `next` into the stack: `0 → 1 → … → n-1`.
    pub(crate) fn init(&self, next: &[AtomicU32]) {
        let count = next.len() as u32;
        for (index, link) in next.iter().enumerate() {
            let successor = index as u32 + 1;
            link.store(
                if successor < count {
                    successor
                } else {
                    INVALID_INDEX
                },
                Ordering::Relaxed,
            );
        }
        let top = if count > 0 { 0 } else { INVALID_INDEX };
        self.head.store(pack(0, top), Ordering::Release);
    }

    /// Pop the top index, or `None` when the stack is empty.
    pub(crate) fn pop(&self, next: &[AtomicU32]) -> Option<u32> {
        loop {
            let head = self.head.load(Ordering::Acquire);
            let index = unpack_index(head);
            if index == INVALID_INDEX {
                return None;
            }

            // A stale successor read is harmless: the generation bump makes
            // the exchange fail and we retry with a fresh head.
            let successor = next[index as usize].load(Ordering::Acquire);
            let new_head = pack(unpack_generation(head).wrapping_add(1), successor);
            if self
                .head
                .compare_exchange_weak(head, new_head, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                next[index as usize].store(CLAIMED, Ordering::Release);
                return Some(index);
            }
            std::hint::spin_loop();
        }
    }

    /// Push `index` back onto the stack.
    ///
    /// Returns `false` without modifying the stack when the entry was not
    /// claimed, i.e. on a possible double free.
    #[must_use]
    pub(crate) fn push(&self, next: &[AtomicU32], index: u32) -> bool {
        debug_assert!((index as usize) < next.len());
        if next[index as usize].load(Ordering::Acquire) != CLAIMED {
            return false;
        }

        loop {
            let head = self.head.load(Ordering::Acquire);
            next[index as usize].store(unpack_index(head), Ordering::Release);
            let new_head = pack(unpack_generation(head).wrapping_add(1), index);
            if self
                .head
                .compare_exchange_weak(head, new_head, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return true;
            }
            std::hint::spin_loop();
        }
    }
}

#[inline]
fn pack(generation: u32, index: u32) -> u64 {
    (u64::from(generation) << 32) | u64::from(index)
}

#[inline]
fn unpack_index(head: u64) -> u32 {
    head as u32
}

#[inline]
fn unpack_generation(head: u64) -> u32 {
    (head >> 32) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn freelist_with_table(count: usize) -> (IndexFreeList, Vec<AtomicU32>) {
        let list = IndexFreeList::new();
        let table: Vec<AtomicU32> = (0..count).map(|_| AtomicU32::new(0)).collect();
        list.init(&table);
        (list, table)
    }

    #[test]
    fn test_pop_yields_each_index_once() {
        let (list, table) = freelist_with_table(16);

        let mut seen = vec![false; 16];
        while let Some(index) = list.pop(&table) {
            assert!(!seen[index as usize]);
            seen[index as usize] = true;
        }
        assert!(seen.iter().all(|&taken| taken));
        assert_eq!(list.pop(&table), None);
    }

    #[test]
    fn test_push_pop_roundtrip() {
        let (list, table) = freelist_with_table(4);

        let a = list.pop(&table).unwrap();
        let b = list.pop(&table).unwrap();
        assert!(list.push(&table, a));
        assert!(list.push(&table, b));

        let mut recovered = 0;
        while list.pop(&table).is_some() {
            recovered += 1;
        }
        assert_eq!(recovered, 4);
    }

    #[test]
    fn test_double_free_is_refused() {
        let (list, table) = freelist_with_table(4);

        let index = list.pop(&table).unwrap();
        assert!(list.push(&table, index));
        assert!(!list.push(&table, index));
    }

    #[test]
    fn test_concurrent_pop_push_preserves_indices() {
        let (list, table) = freelist_with_table(256);
        let shared = Arc::new((list, table));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let shared = Arc::clone(&shared);
                thread::spawn(move || {
                    let (list, table) = &*shared;
                    for _ in 0..1000 {
                        if let Some(index) = list.pop(table) {
                            assert!(list.push(table, index));
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let (list, table) = &*shared;
        let mut recovered = vec![false; 256];
        while let Some(index) = list.pop(table) {
            assert!(!recovered[index as usize]);
            recovered[index as usize] = true;
        }
        assert!(recovered.iter().all(|&taken| taken));
    }
}
