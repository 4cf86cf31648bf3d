//! Memory pool benchmarks.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::ptr::NonNull;
use std::sync::Arc;
use zenith::chunk::{DEFAULT_USER_PAYLOAD_ALIGNMENT, NO_USER_HEADER_ALIGNMENT, NO_USER_HEADER_SIZE};
use zenith::config::MemPoolConfig;
use zenith::mem::{BumpAllocator, MemoryManager};
use zenith::port::UniquePortId;

struct ManagerFixture {
    _memory: Vec<u8>,
    manager: MemoryManager,
}

// SAFETY: the manager handle is shareable; the backing memory stays alive
// inside the Arc'd fixture.
unsafe impl Send for ManagerFixture {}
unsafe impl Sync for ManagerFixture {}

fn manager_fixture(chunk_size: u32, chunk_count: u32) -> ManagerFixture {
    let mut config = MemPoolConfig::new();
    config.add_pool(chunk_size, chunk_count);
    let mut memory = vec![0u8; MemoryManager::required_memory_size(&config)];
    let base = NonNull::new(memory.as_mut_ptr()).unwrap();
    // SAFETY: `memory` lives inside the fixture, which outlives the manager.
    let mut allocator = unsafe { BumpAllocator::new(base, memory.len()) };
    let manager = MemoryManager::new(&config, &mut allocator).unwrap();
    ManagerFixture {
        _memory: memory,
        manager,
    }
}

fn bench_chunk_acquire_release(c: &mut Criterion) {
    let mut group = c.benchmark_group("chunk_acquire_release");

    for chunk_count in [16u32, 64, 256, 1024] {
        let fixture = manager_fixture(1024, chunk_count);
        let origin = UniquePortId::new();

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(
            BenchmarkId::from_parameter(chunk_count),
            &fixture,
            |b, fixture| {
                b.iter(|| {
                    let chunk = fixture
                        .manager
                        .get_chunk(
                            origin,
                            1024,
                            DEFAULT_USER_PAYLOAD_ALIGNMENT,
                            NO_USER_HEADER_SIZE,
                            NO_USER_HEADER_ALIGNMENT,
                        )
                        .expect("pool not exhausted");
                    drop(chunk);
                });
            },
        );
    }

    group.finish();
}

fn bench_concurrent_allocation(c: &mut Criterion) {
    let mut group = c.benchmark_group("chunk_concurrent");

    let fixture = Arc::new(manager_fixture(1024, 1024));

    group.throughput(Throughput::Elements(400));
    group.bench_function("4_threads_100_chunks_each", |b| {
        b.iter(|| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let fixture = Arc::clone(&fixture);
                    std::thread::spawn(move || {
                        let origin = UniquePortId::new();
                        for _ in 0..100 {
                            if let Ok(chunk) = fixture.manager.get_chunk(
                                origin,
                                1024,
                                DEFAULT_USER_PAYLOAD_ALIGNMENT,
                                NO_USER_HEADER_SIZE,
                                NO_USER_HEADER_ALIGNMENT,
                            ) {
                                std::hint::black_box(chunk.user_payload());
                            }
                        }
                    })
                })
                .collect();

            for handle in handles {
                handle.join().unwrap();
            }
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_chunk_acquire_release,
    bench_concurrent_allocation
);
criterion_main!(benches);
