//! Streaming buffer throughput
//!
//! Measures chunk appends and sequential reads of a full track's worth of
//! bytes (4 MiB, roughly four minutes of 128 kbit/s mp3).

use chunkplay_client::buffer::{ReadOutcome, StreamingBuffer};
use chunkplay_client::playback::ring_buffer::{Frame, FrameRing};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::io::Read;

const TRACK_BYTES: usize = 4 * 1024 * 1024;

fn bench_streaming_buffer(c: &mut Criterion) {
    let mut group = c.benchmark_group("streaming_buffer");
    group.throughput(Throughput::Bytes(TRACK_BYTES as u64));

    for chunk_size in [16 * 1024, 240 * 1024] {
        let chunk = vec![0x5au8; chunk_size];

        group.bench_with_input(BenchmarkId::new("append", chunk_size), &chunk, |b, chunk| {
            b.iter(|| {
                let (mut writer, _reader) = StreamingBuffer::with_capacity(TRACK_BYTES).split();
                for _ in 0..TRACK_BYTES / chunk.len() {
                    writer.append(black_box(chunk));
                }
                writer.finish();
            });
        });
    }

    group.bench_function("try_read_4k", |b| {
        let data = vec![0x5au8; TRACK_BYTES];
        let mut dst = vec![0u8; 4096];

        b.iter(|| {
            let (mut writer, mut reader) = StreamingBuffer::with_capacity(TRACK_BYTES).split();
            writer.append(&data);
            writer.finish();
            while let ReadOutcome::Data(n) = reader.try_read(&mut dst) {
                black_box(n);
            }
        });
    });

    group.bench_function("blocking_read_to_end", |b| {
        let data = vec![0x5au8; TRACK_BYTES];

        b.iter(|| {
            let (mut writer, mut reader) = StreamingBuffer::with_capacity(TRACK_BYTES).split();
            writer.append(&data);
            writer.finish();
            let mut out = Vec::with_capacity(TRACK_BYTES);
            reader.read_to_end(&mut out).unwrap();
            black_box(out.len());
        });
    });

    group.finish();
}

fn bench_frame_ring(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_ring");

    group.bench_function("push_pop_1s", |b| {
        let (mut producer, mut consumer) = FrameRing::new(Some(44_100)).split();
        let frame = Frame::from_stereo(0.5, -0.5);

        b.iter(|| {
            for _ in 0..44_100 {
                producer.push(black_box(frame));
            }
            while let Some(frame) = consumer.pop(true) {
                black_box(frame);
            }
        });
    });

    group.finish();
}

criterion_group!(benches, bench_streaming_buffer, bench_frame_ring);
criterion_main!(benches);
