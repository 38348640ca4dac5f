//! Benchmarks for the ring buffer and bridge hot paths.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use fx_link::audio::{AudioBridge, RingBuffer};
use fx_link::constants::{RENDER_QUANTUM, RING_BUFFER_CAPACITY, SAMPLES_PER_PACKET};

fn push_pop(c: &mut Criterion) {
    let mut group = c.benchmark_group("ring_buffer");
    let buffer = RingBuffer::new(RING_BUFFER_CAPACITY);

    group.bench_function("push_pop_single", |b| {
        b.iter(|| {
            buffer.push(black_box(0.5));
            black_box(buffer.pop())
        })
    });

    group.bench_function("pop_empty", |b| b.iter(|| black_box(buffer.pop())));

    let packet = vec![0.25f32; SAMPLES_PER_PACKET];
    group.throughput(Throughput::Elements(SAMPLES_PER_PACKET as u64));
    group.bench_function("push_packet_overwriting", |b| {
        let small = RingBuffer::new(SAMPLES_PER_PACKET);
        b.iter(|| small.push_slice(black_box(&packet)))
    });

    group.finish();
}

fn bridge_pull(c: &mut Criterion) {
    let mut group = c.benchmark_group("bridge_pull");
    let packet = vec![0.25f32; SAMPLES_PER_PACKET];

    for quantum in [RENDER_QUANTUM, 256, SAMPLES_PER_PACKET] {
        group.throughput(Throughput::Elements(quantum as u64));
        group.bench_with_input(BenchmarkId::from_parameter(quantum), &quantum, |b, &quantum| {
            let bridge = AudioBridge::new(RING_BUFFER_CAPACITY);
            let mut frame = vec![0.0f32; quantum];
            b.iter(|| {
                bridge.on_network_batch(&packet);
                bridge.pull_into(black_box(&mut frame));
            })
        });
    }

    group.finish();
}

criterion_group!(benches, push_pop, bridge_pull);
criterion_main!(benches);
