//! Paired enqueue/dequeue throughput on an otherwise quiet queue: the
//! classic uncontended round-trip cost per variant.

use std::ptr::NonNull;

use criterion::{criterion_group, criterion_main, Criterion};

use ringflux::{
    BoundedCrqQueue, BoundedMtqQueue, BoundedPrqQueue, LinkedCrqQueue, LinkedMtqQueue,
    LinkedPrqQueue, MpmcQueue, SpscRing,
};

const SIZE: usize = 1024;
const THREADS: usize = 8;

fn bench_pair<Q: MpmcQueue<u64>>(c: &mut Criterion, name: &str, queue: Q) {
    let payload = 0u64;
    let item = NonNull::from(&payload);
    c.bench_function(name, |b| {
        b.iter(|| {
            assert!(queue.push(item, 0));
            std::hint::black_box(queue.pop(0));
        })
    });
}

fn pairs(c: &mut Criterion) {
    bench_pair(c, "pairs/linked_crq", LinkedCrqQueue::<u64>::new(SIZE, THREADS));
    bench_pair(c, "pairs/linked_prq", LinkedPrqQueue::<u64>::new(SIZE, THREADS));
    bench_pair(c, "pairs/linked_mtq", LinkedMtqQueue::<u64>::new(SIZE, THREADS));
    bench_pair(c, "pairs/bounded_crq", BoundedCrqQueue::<u64>::new(SIZE, THREADS));
    bench_pair(c, "pairs/bounded_prq", BoundedPrqQueue::<u64>::new(SIZE, THREADS));
    bench_pair(c, "pairs/bounded_mtq", BoundedMtqQueue::<u64>::new(SIZE, THREADS));

    let spsc = SpscRing::<u64>::new(SIZE);
    let payload = 0u64;
    let item = NonNull::from(&payload);
    c.bench_function("pairs/spsc_ring", |b| {
        b.iter(|| {
            assert!(spsc.push(item));
            std::hint::black_box(spsc.pop());
        })
    });
}

criterion_group!(benches, pairs);
criterion_main!(benches);
