//! Codec benchmarks for murmur-protocol.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use murmur_protocol::{codec, ServerEvent};

fn bench_encode_small(c: &mut Criterion) {
    let event = ServerEvent::new_message("alice", "x".repeat(64));

    let mut group = c.benchmark_group("encode");
    group.throughput(Throughput::Bytes(64));
    group.bench_function("small_64B", |b| b.iter(|| codec::encode(black_box(&event))));
    group.finish();
}

fn bench_decode_small(c: &mut Criterion) {
    let frame = format!(
        r#"{{"type":"new_message","username":"alice","message":"{}","ip":"203.0.113.9"}}"#,
        "x".repeat(64)
    );

    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Bytes(frame.len() as u64));
    group.bench_function("small_64B", |b| {
        b.iter(|| codec::decode(black_box(frame.as_bytes())))
    });
    group.finish();
}

fn bench_decode_unknown(c: &mut Criterion) {
    let frame = br#"{"type":"typing","username":"alice"}"#;

    c.bench_function("decode_unknown_type", |b| {
        b.iter(|| codec::decode(black_box(frame)))
    });
}

criterion_group!(
    benches,
    bench_encode_small,
    bench_decode_small,
    bench_decode_unknown
);
criterion_main!(benches);
