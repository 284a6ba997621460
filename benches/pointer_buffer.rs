//! Pointer buffer and ring buffer handoff benchmarks.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use mediaflow::clock::Wait;
use mediaflow::databus::{DataBus, PointerBuffer, RingBuffer};
use std::sync::Arc;

fn bench_pbuf_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("pbuf_round_trip");

    for size in [64usize, 1024, 16 * 1024] {
        let pbuf = PointerBuffer::new("bench", 4).unwrap();

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &pbuf, |b, pbuf| {
            b.iter(|| {
                let mut p = pbuf.acquire_write(size, Wait::NoWait).unwrap();
                p.set_valid_size(size).unwrap();
                pbuf.release_write(p, Wait::NoWait).unwrap();
                let p = pbuf.acquire_read(0, Wait::NoWait).unwrap();
                std::hint::black_box(p.valid_size());
                pbuf.release_read(p, Wait::NoWait).unwrap();
            });
        });
    }

    group.finish();
}

fn bench_ring_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("ring_round_trip");

    for size in [64usize, 1024] {
        let ring = RingBuffer::new("bench", 4 * size).unwrap();

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &ring, |b, ring| {
            b.iter(|| {
                let mut p = ring.acquire_write(size, Wait::NoWait).unwrap();
                p.set_valid_size(size).unwrap();
                ring.release_write(p, Wait::NoWait).unwrap();
                let p = ring.acquire_read(size, Wait::NoWait).unwrap();
                std::hint::black_box(p.valid_size());
                ring.release_read(p, Wait::NoWait).unwrap();
            });
        });
    }

    group.finish();
}

fn bench_pbuf_threads(c: &mut Criterion) {
    let mut group = c.benchmark_group("pbuf_threads");

    group.throughput(Throughput::Elements(1000));
    group.bench_function("producer_consumer_1000", |b| {
        b.iter(|| {
            let pbuf = Arc::new(PointerBuffer::new("bench", 4).unwrap());
            let mut p = pbuf.acquire_write(256, Wait::Forever).unwrap();
            p.set_valid_size(256).unwrap();
            pbuf.release_write(p, Wait::Forever).unwrap();

            let writer = Arc::clone(&pbuf);
            let producer = std::thread::spawn(move || {
                for _ in 1..1000 {
                    let mut p = writer.acquire_write(256, Wait::Forever).unwrap();
                    p.set_valid_size(256).unwrap();
                    writer.release_write(p, Wait::Forever).unwrap();
                }
                writer.done_write();
            });

            loop {
                let p = pbuf.acquire_read(0, Wait::Forever).unwrap();
                let end = p.is_done() && p.valid_size() == 0;
                pbuf.release_read(p, Wait::Forever).unwrap();
                if end {
                    break;
                }
            }
            producer.join().unwrap();
        });
    });

    group.finish();
}

criterion_group!(benches, bench_pbuf_round_trip, bench_ring_round_trip, bench_pbuf_threads);
criterion_main!(benches);
