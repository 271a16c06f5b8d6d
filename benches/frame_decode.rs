//! Benchmarks for the wire and clip codecs
//!
//! Tests the per-datagram cost on the receive path:
//! - LZ4 frame decompression plus JSON parsing of one datagram
//! - Encoding, for senders and tests
//! - Batch decode of a clip-sized blob
//!
//! Platform: Cross-platform (synthetic frames, CI-safe)

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use mocap_live::codec;
use mocap_live::test_utils::{sample_frame, sample_frames};
use std::hint::black_box;

fn bench_datagram_decode(c: &mut Criterion) {
    let bytes = codec::encode(&sample_frame(7)).expect("encode sample frame");

    let mut group = c.benchmark_group("datagram");
    group.throughput(Throughput::Bytes(bytes.len() as u64));

    group.bench_function("decode", |b| b.iter(|| black_box(codec::decode(black_box(&bytes)))));

    let frame = sample_frame(7);
    group.bench_function("encode", |b| b.iter(|| black_box(codec::encode(black_box(&frame)))));

    group.finish();
}

fn bench_batch_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("clip_batch");

    for frames in [60usize, 600, 3600] {
        let blob = codec::encode_batch(&sample_frames(frames)).expect("encode batch");
        group.throughput(Throughput::Elements(frames as u64));
        group.bench_with_input(BenchmarkId::from_parameter(frames), &blob, |b, blob| {
            b.iter(|| black_box(codec::decode_batch(black_box(blob))))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_datagram_decode, bench_batch_decode);
criterion_main!(benches);
