use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use tensorlane::{SignalPool, StreamContext, StreamKind, StreamSignal};

fn bench_workspace_reuse(c: &mut Criterion) {
    let stream = StreamContext::new(StreamKind::Cpu).unwrap();
    stream.workspace(1 << 20);
    c.bench_function("workspace_reuse_1mib", |bencher| {
        bencher.iter(|| {
            let ws = stream.workspace(1 << 20);
            black_box(ws.as_ptr());
        });
    });
}

fn bench_pooled_acquire(c: &mut Criterion) {
    let pool = SignalPool::new();
    let stream = StreamContext::new(StreamKind::Cpu).unwrap();
    c.bench_function("pooled_signal_acquire", |bencher| {
        bencher.iter(|| black_box(pool.acquire(&stream).unwrap()));
    });
}

fn bench_fresh_signal(c: &mut Criterion) {
    c.bench_function("fresh_signal_alloc", |bencher| {
        bencher.iter(|| black_box(StreamSignal::new(StreamKind::Cpu).unwrap()));
    });
}

criterion_group!(
    benches,
    bench_workspace_reuse,
    bench_pooled_acquire,
    bench_fresh_signal
);
criterion_main!(benches);
