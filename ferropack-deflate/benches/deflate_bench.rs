//! Performance benchmarks for ferropack-deflate.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use ferropack_deflate::{deflate, inflate};
use std::hint::black_box;

fn text_data(size: usize) -> Vec<u8> {
    let text: &[u8] = b"The quick brown fox jumps over the lazy dog. \
                        Pack my box with five dozen liquor jugs. ";
    text.iter().cycle().take(size).copied().collect()
}

fn bench_deflate_levels(c: &mut Criterion) {
    let data = text_data(65536);
    let mut group = c.benchmark_group("deflate_compress");
    group.throughput(Throughput::Bytes(data.len() as u64));
    for level in [1u8, 6, 9] {
        group.bench_with_input(BenchmarkId::from_parameter(level), &level, |b, &level| {
            b.iter(|| deflate(black_box(&data), level).unwrap());
        });
    }
    group.finish();
}

fn bench_inflate(c: &mut Criterion) {
    let data = text_data(65536);
    let compressed = deflate(&data, 6).unwrap();
    let mut group = c.benchmark_group("deflate_decompress");
    group.throughput(Throughput::Bytes(data.len() as u64));
    group.bench_function("text_64k", |b| {
        b.iter(|| inflate(black_box(&compressed)).unwrap());
    });
    group.finish();
}

criterion_group!(benches, bench_deflate_levels, bench_inflate);
criterion_main!(benches);
