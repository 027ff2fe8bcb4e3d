//! End-to-end DEFLATE stream tests.

use ferropack_core::FerropackError;
use ferropack_deflate::{Deflater, Inflater, deflate, inflate, zlib_compress, zlib_decompress};

fn pattern_bytes(count: usize) -> Vec<u8> {
    (0..count).map(|i| (i % 251) as u8).collect()
}

#[test]
fn sliding_window_pattern_roundtrips() {
    // 65537 bytes exercises window wrap and overlapping copies.
    let data = pattern_bytes(65_537);
    for level in [1u8, 6, 9] {
        let compressed = deflate(&data, level).unwrap();
        let decompressed = inflate(&compressed).unwrap();
        assert_eq!(decompressed.len(), data.len());
        assert_eq!(decompressed, data, "level {level}");
    }
}

#[test_log::test]
fn all_levels_and_wrappers_roundtrip() {
    let mut data = Vec::new();
    data.extend_from_slice(&pattern_bytes(10_000));
    data.extend_from_slice("text with natural repetition, repetition, repetition. ".repeat(100).as_bytes());
    for level in 0..=9u8 {
        for raw in [true, false] {
            let compressed = if raw {
                deflate(&data, level).unwrap()
            } else {
                zlib_compress(&data, level).unwrap()
            };
            let decompressed = if raw {
                inflate(&compressed).unwrap()
            } else {
                zlib_decompress(&compressed).unwrap()
            };
            assert_eq!(decompressed, data, "level {level} raw {raw}");
        }
    }
}

#[test]
fn byte_at_a_time_input_never_errors() {
    let data = b"state machines suspend at any byte boundary".repeat(40);
    let compressed = zlib_compress(&data, 6).unwrap();

    let mut inflater = Inflater::new(false);
    let mut out = Vec::new();
    let mut buf = [0u8; 512];
    for &byte in &compressed {
        inflater.set_input(&[byte]).unwrap();
        loop {
            let n = inflater.inflate(&mut buf).unwrap();
            out.extend_from_slice(&buf[..n]);
            if n == 0 {
                break;
            }
        }
    }
    assert!(inflater.is_finished());
    assert_eq!(out, data);
}

#[test]
fn one_byte_output_buffer_works() {
    let data = b"tiny output buffers force repeated suspension".repeat(20);
    let compressed = deflate(&data, 6).unwrap();

    let mut inflater = Inflater::new(true);
    inflater.set_input(&compressed).unwrap();
    let mut out = Vec::new();
    let mut one = [0u8; 1];
    loop {
        let n = inflater.inflate(&mut one).unwrap();
        if n == 0 {
            break;
        }
        out.push(one[0]);
    }
    assert_eq!(out, data);
}

#[test]
fn payload_mutation_is_detected() {
    let data = b"the adler trailer guards this stream".repeat(100);
    let mut compressed = zlib_compress(&data, 6).unwrap();
    let victim = compressed.len() / 2;
    compressed[victim] ^= 0x40;

    let result = zlib_decompress(&compressed);
    assert!(
        matches!(
            result,
            Err(FerropackError::ChecksumMismatch { .. }) | Err(FerropackError::CorruptData { .. })
        ),
        "mutation must be caught, got {result:?}"
    );
}

#[test]
fn streaming_deflater_with_chunked_input() {
    let data = pattern_bytes(200_000);
    let mut deflater = Deflater::new(6, false);
    let mut compressed = Vec::new();
    let mut buf = [0u8; 4096];

    for chunk in data.chunks(7_001) {
        deflater.set_input(chunk).unwrap();
        while !deflater.needs_input() {
            let n = deflater.deflate(&mut buf).unwrap();
            compressed.extend_from_slice(&buf[..n]);
        }
    }
    deflater.finish();
    while !deflater.is_finished() {
        let n = deflater.deflate(&mut buf).unwrap();
        compressed.extend_from_slice(&buf[..n]);
    }

    assert_eq!(deflater.total_in(), data.len() as u64);
    assert_eq!(deflater.total_out(), compressed.len() as u64);
    assert_eq!(zlib_decompress(&compressed).unwrap(), data);
}

#[test]
fn huffman_only_strategy_roundtrips() {
    let data = b"strategy test data with repeats repeats repeats".repeat(30);
    let mut deflater = Deflater::new(6, true);
    deflater.set_strategy(ferropack_deflate::DeflateStrategy::HuffmanOnly);
    deflater.set_input(&data).unwrap();
    deflater.finish();
    let mut compressed = Vec::new();
    let mut buf = [0u8; 4096];
    while !deflater.is_finished() {
        let n = deflater.deflate(&mut buf).unwrap();
        compressed.extend_from_slice(&buf[..n]);
    }
    assert_eq!(inflate(&compressed).unwrap(), data);
}
