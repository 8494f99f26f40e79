//! Disassembler throughput benchmarks.
//!
//! Feeds a stream of event packets in different chunk sizes, from one
//! packet per read up to the whole stream in one read.
//!
//! Run with: cargo bench --bench disassembler
//! Results saved to: target/criterion/

use std::hint::black_box;

use ami_manager::protocol::{PacketDisassembler, assemble};
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};

// ============================================================================
// Benchmark Parameters
// ============================================================================

const PACKET_COUNT: usize = 2_000;
const CHUNK_SIZES: &[usize] = &[64, 1024, 64 * 1024, 1024 * 1024];

// ============================================================================
// Fixtures
// ============================================================================

fn event_stream() -> Vec<u8> {
    let mut wire = Vec::new();
    for n in 0..PACKET_COUNT {
        let channel = format!("SIP/{n}");
        wire.extend(assemble([
            ("Event", "Newchannel"),
            ("Privilege", "call,all"),
            ("Channel", channel.as_str()),
            ("ChannelState", "0"),
            ("CallerIDNum", "1000"),
            ("Uniqueid", "1700000000.1"),
        ]));
    }
    wire
}

// ============================================================================
// Benchmark: Feed
// ============================================================================

fn bench_feed(c: &mut Criterion) {
    let wire = event_stream();

    let mut group = c.benchmark_group("packet_feed");
    group.throughput(Throughput::Bytes(wire.len() as u64));

    for &chunk_size in CHUNK_SIZES {
        group.bench_with_input(
            BenchmarkId::new("chunk", chunk_size),
            &chunk_size,
            |b, &size| {
                b.iter(|| {
                    let mut disassembler = PacketDisassembler::new();
                    let mut parsed = 0;
                    for chunk in wire.chunks(size) {
                        parsed += disassembler.feed(black_box(chunk)).len();
                    }
                    assert_eq!(parsed, PACKET_COUNT);
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_feed);
criterion_main!(benches);
