//! Throughput benchmark of the grammar oracle and the tracer's
//! `predict_next` query over synthetic periodic and semi-random I/O
//! traces, adapted from the teacher's `benches/compression.rs` (same
//! `criterion` harness, same shape of repetitive/low-repetition input
//! generators) onto this crate's symbol-stream oracle instead of the raw
//! byte-stream Sequitur compressor it benchmarked.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use omniscio_predictor::{ApiType, CallingContext, FileHandle, Tracer};

/// A strided access pattern over `n_contexts` distinct calling contexts,
/// repeated `rounds` times — the kind of periodic trace `predict_next`
/// is designed to lock onto quickly.
fn periodic_trace(n_contexts: usize, rounds: usize) -> Vec<usize> {
    let mut trace = Vec::with_capacity(n_contexts * rounds);
    for _ in 0..rounds {
        for c in 0..n_contexts {
            trace.push(c);
        }
    }
    trace
}

/// A low-repetition trace: each step picks a context via a simple LCG
/// rather than cycling, so the grammar keeps growing instead of
/// converging onto a small repeating rule.
fn low_repetition_trace(n_contexts: usize, len: usize) -> Vec<usize> {
    let mut seed = 12345u64;
    let mut trace = Vec::with_capacity(len);
    for _ in 0..len {
        seed = seed.wrapping_mul(1103515245).wrapping_add(12345);
        trace.push((seed % n_contexts as u64) as usize);
    }
    trace
}

fn contexts_for(n: usize) -> Vec<CallingContext> {
    (0..n)
        .map(|i| CallingContext::new(vec![0x1000 + i as u64]).unwrap())
        .collect()
}

fn drive_trace(tracer: &mut Tracer, contexts: &[CallingContext], trace: &[usize]) {
    let handle = FileHandle(1);
    let mut offset = 0i64;
    for &idx in trace {
        tracer
            .write_start(contexts[idx].clone(), ApiType::Posix, handle, offset, 4096)
            .unwrap();
        tracer.write_end(true).unwrap();
        offset += 4096;
    }
}

fn bench_feed_periodic(c: &mut Criterion) {
    let mut group = c.benchmark_group("feed_periodic");
    for &rounds in &[100usize, 1_000, 10_000] {
        let contexts = contexts_for(4);
        let trace = periodic_trace(4, rounds);
        group.bench_with_input(BenchmarkId::new("rounds", rounds), &trace, |b, trace| {
            b.iter(|| {
                let mut tracer = Tracer::in_memory();
                drive_trace(&mut tracer, &contexts, black_box(trace));
                black_box(tracer.predict_next().unwrap())
            });
        });
    }
    group.finish();
}

fn bench_feed_low_repetition(c: &mut Criterion) {
    let mut group = c.benchmark_group("feed_low_repetition");
    for &len in &[1_000usize, 10_000] {
        let contexts = contexts_for(32);
        let trace = low_repetition_trace(32, len);
        group.bench_with_input(BenchmarkId::new("len", len), &trace, |b, trace| {
            b.iter(|| {
                let mut tracer = Tracer::in_memory();
                drive_trace(&mut tracer, &contexts, black_box(trace));
                black_box(tracer.predict_next().unwrap())
            });
        });
    }
    group.finish();
}

fn bench_predict_next_steady_state(c: &mut Criterion) {
    let mut group = c.benchmark_group("predict_next_steady_state");
    for &n_contexts in &[4usize, 16, 64] {
        let contexts = contexts_for(n_contexts);
        let trace = periodic_trace(n_contexts, 50);
        let mut tracer = Tracer::in_memory();
        drive_trace(&mut tracer, &contexts, &trace);

        group.bench_with_input(
            BenchmarkId::new("contexts", n_contexts),
            &tracer,
            |b, tracer| {
                b.iter(|| black_box(tracer.predict_next().unwrap()));
            },
        );
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_feed_periodic,
    bench_feed_low_repetition,
    bench_predict_next_steady_state,
);
criterion_main!(benches);
