//! Integration tests for chunk queues fed by real publishers.

use std::ptr::NonNull;
use std::sync::Arc;
use std::thread;
use zenith::chunk::{
    ChunkHeader, SharedChunk, DEFAULT_USER_PAYLOAD_ALIGNMENT, NO_USER_HEADER_ALIGNMENT,
    NO_USER_HEADER_SIZE,
};
use zenith::config::{
    ChunkQueueConfig, ChunkSenderConfig, MemPoolConfig, QueueFullPolicy, QueueVariant,
};
use zenith::mem::{BumpAllocator, MemoryManager};
use zenith::port::UniquePortId;
use zenith::transport::{ChunkQueueData, ChunkQueuePopper, ChunkSender, ChunkSenderData};

struct Fixture {
    _memory: Vec<u8>,
    manager: MemoryManager,
}

impl Fixture {
    fn new(chunk_size: u32, chunk_count: u32) -> Self {
        let mut config = MemPoolConfig::new();
        config.add_pool(chunk_size, chunk_count);

        let mut memory = vec![0u8; MemoryManager::required_memory_size(&config)];
        let base = NonNull::new(memory.as_mut_ptr()).unwrap();
        // SAFETY: `memory` lives as long as the fixture.
        let mut allocator = unsafe { BumpAllocator::new(base, memory.len()) };
        let manager = MemoryManager::new(&config, &mut allocator).unwrap();

        Self {
            _memory: memory,
            manager,
        }
    }
}

// SAFETY: the manager handle is shareable; the backing memory is kept
// alive by the Arc'd fixture.
unsafe impl Send for Fixture {}
unsafe impl Sync for Fixture {}

fn publish(sender: &ChunkSender, origin: UniquePortId, value: u64) -> NonNull<ChunkHeader> {
    let header = sender
        .try_allocate(
            origin,
            std::mem::size_of::<u64>() as u32,
            DEFAULT_USER_PAYLOAD_ALIGNMENT,
            NO_USER_HEADER_SIZE,
            NO_USER_HEADER_ALIGNMENT,
        )
        .unwrap();
    // SAFETY: the payload belongs to the publisher until `send`.
    unsafe { header.as_ref().user_payload().cast::<u64>().write(value) };
    header
}

fn read_value(chunk: &SharedChunk) -> u64 {
    // SAFETY: written by the publisher before sending.
    unsafe { chunk.user_payload().cast::<u64>().read() }
}

#[test]
fn test_round_trip_preserves_payload_pointer_and_origin() {
    let fixture = Fixture::new(128, 8);
    let queue = ChunkQueueData::new(ChunkQueueConfig::default()).unwrap();
    let data = ChunkSenderData::new(fixture.manager, &ChunkSenderConfig::default()).unwrap();
    let sender = ChunkSender::new(&data);
    sender.try_add_queue(&queue, 0).unwrap();

    let origin = UniquePortId::new();
    let header = publish(&sender, origin, 7);
    let payload_before = unsafe { header.as_ref().user_payload() };
    sender.send(header);

    let chunk = ChunkQueuePopper::new(&queue).try_pop().unwrap();
    assert_eq!(chunk.user_payload(), payload_before);
    assert_eq!(chunk.header().origin_id(), origin);
    assert_eq!(read_value(&chunk), 7);
}

#[test]
fn test_two_publishers_interleave_with_per_publisher_fifo() {
    let fixture = Arc::new(Fixture::new(64, 256));
    let queue = Arc::new(
        ChunkQueueData::new(ChunkQueueConfig {
            capacity: 256,
            full_policy: QueueFullPolicy::DiscardOldestData,
            variant: QueueVariant::MultiProducerSingleConsumer,
        })
        .unwrap(),
    );

    const PER_PUBLISHER: u64 = 100;

    let publishers: Vec<_> = (0..2u64)
        .map(|publisher_index| {
            let fixture = Arc::clone(&fixture);
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                let data =
                    ChunkSenderData::new(fixture.manager, &ChunkSenderConfig::default()).unwrap();
                let sender = ChunkSender::new(&data);
                let queue_ref: &ChunkQueueData = &queue;
                // SAFETY: the Arc'd queue outlives this thread's sender.
                let queue_ref: &'static ChunkQueueData =
                    unsafe { std::mem::transmute(queue_ref) };
                sender.try_add_queue(queue_ref, 0).unwrap();

                let origin = UniquePortId::new();
                for i in 0..PER_PUBLISHER {
                    let header = publish(&sender, origin, publisher_index * 1_000 + i);
                    sender.send(header);
                }
                sender.release_all();
                origin
            })
        })
        .collect();

    let origins: Vec<UniquePortId> = publishers
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect();

    // Per publisher, both values and sequence numbers must pop in
    // strictly increasing order; the interleaving itself is free.
    let popper = ChunkQueuePopper::new(&queue);
    let mut last_seen: Vec<Option<(u64, u64)>> = vec![None; origins.len()];
    let mut popped = 0u64;
    while let Some(chunk) = popper.try_pop() {
        popped += 1;
        let publisher = origins
            .iter()
            .position(|origin| *origin == chunk.header().origin_id())
            .unwrap();
        let observation = (chunk.header().sequence_number(), read_value(&chunk));
        if let Some((last_seq, last_value)) = last_seen[publisher] {
            assert!(observation.0 > last_seq);
            assert!(observation.1 > last_value);
        }
        last_seen[publisher] = Some(observation);
    }
    assert_eq!(popped, 2 * PER_PUBLISHER);

    drop(popper);
    assert_eq!(fixture.manager.pool_info(0).used_chunks, 0);
}

#[test]
fn test_discard_oldest_queue_keeps_newest_publications() {
    let fixture = Fixture::new(128, 16);
    let queue = ChunkQueueData::new(ChunkQueueConfig {
        capacity: 4,
        full_policy: QueueFullPolicy::DiscardOldestData,
        variant: QueueVariant::SingleProducerSingleConsumer,
    })
    .unwrap();
    let data = ChunkSenderData::new(fixture.manager, &ChunkSenderConfig::default()).unwrap();
    let sender = ChunkSender::new(&data);
    sender.try_add_queue(&queue, 0).unwrap();

    let origin = UniquePortId::new();
    for i in 0..10u64 {
        let header = publish(&sender, origin, i);
        sender.send(header);
    }

    let popper = ChunkQueuePopper::new(&queue);
    let received: Vec<u64> = std::iter::from_fn(|| popper.try_pop())
        .map(|chunk| read_value(&chunk))
        .collect();
    assert_eq!(received, vec![6, 7, 8, 9]);

    // Evicted chunks went back to the pool; the queue, the history-less
    // sender's last chunk, and nothing else remain.
    sender.release_all();
    assert_eq!(fixture.manager.pool_info(0).used_chunks, 0);
}

#[test]
fn test_removed_queue_stops_receiving() {
    let fixture = Fixture::new(128, 8);
    let queue = ChunkQueueData::new(ChunkQueueConfig::default()).unwrap();
    let data = ChunkSenderData::new(fixture.manager, &ChunkSenderConfig::default()).unwrap();
    let sender = ChunkSender::new(&data);
    sender.try_add_queue(&queue, 0).unwrap();

    let origin = UniquePortId::new();
    sender.send(publish(&sender, origin, 1));
    sender.remove_queue(&queue);
    sender.send(publish(&sender, origin, 2));

    let popper = ChunkQueuePopper::new(&queue);
    assert_eq!(read_value(&popper.try_pop().unwrap()), 1);
    assert!(popper.try_pop().is_none());
}
