//! Benchmarks for the per-frame wire paths
//!
//! - Orientation decode (runs for every telemetry frame, ~100 Hz)
//! - Handshake validation (once per connection, but scales with frame length)
//! - Video payload chunking

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use protocol::video::chunks;
use protocol::{
    MAX_CHUNK_LEN, Orientation, ViewerParams, decode_orientation, encode_handshake,
    encode_length_header, encode_orientation, parse_handshake,
};

fn benchmark_orientation(c: &mut Criterion) {
    let mut group = c.benchmark_group("orientation");

    let frame = encode_orientation(&Orientation {
        x: 0.1,
        y: 0.2,
        z: 0.3,
        w: 0.9,
    });

    group.bench_function("decode", |b| {
        b.iter(|| decode_orientation(black_box(&frame)))
    });

    group.finish();
}

fn benchmark_handshake(c: &mut Criterion) {
    let mut group = c.benchmark_group("handshake");

    let params = ViewerParams {
        width: 1920,
        height: 1080,
        interpupillary_distance: 0.064,
    };

    for len in [16usize, 1024, 16 * 1024] {
        let frame = encode_handshake(&params, len);
        group.throughput(Throughput::Bytes(len as u64));
        group.bench_with_input(BenchmarkId::new("parse", len), &frame, |b, frame| {
            b.iter(|| parse_handshake(black_box(frame), len))
        });
    }

    group.finish();
}

fn benchmark_video_framing(c: &mut Criterion) {
    let mut group = c.benchmark_group("video_framing");

    for size in [64 * 1024usize, 512 * 1024, 2 * 1024 * 1024] {
        let payload = vec![0x5Au8; size];
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("frame", size), &payload, |b, payload| {
            b.iter(|| {
                let header = encode_length_header(payload.len()).unwrap();
                let mut total = header.len();
                for chunk in chunks(black_box(payload), MAX_CHUNK_LEN) {
                    total += chunk.len();
                }
                total
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_orientation,
    benchmark_handshake,
    benchmark_video_framing
);
criterion_main!(benches);
