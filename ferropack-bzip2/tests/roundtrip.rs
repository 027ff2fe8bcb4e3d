//! End-to-end BZip2 stream tests.

use ferropack_bzip2::{BzDecoder, CompressionLevel, compress, decompress};
use ferropack_core::FerropackError;
use std::io::{Cursor, Read};

fn lcg_bytes(count: usize, mut state: u32) -> Vec<u8> {
    (0..count)
        .map(|_| {
            state = state.wrapping_mul(1664525).wrapping_add(1013904223);
            (state >> 24) as u8
        })
        .collect()
}

#[test]
fn empty_input_stream_is_exactly_14_bytes() {
    let compressed = compress(b"", CompressionLevel::new(1)).unwrap();
    assert_eq!(
        compressed,
        [0x42, 0x5A, 0x68, 0x31, 0x17, 0x72, 0x45, 0x38, 0x50, 0x90, 0x00, 0x00, 0x00, 0x00]
    );
}

#[test_log::test]
fn multi_block_stream_roundtrips() {
    // 300KB of mixed content at level 1 spans three blocks.
    let mut data = Vec::with_capacity(300_000);
    for chunk in 0..300 {
        data.extend_from_slice(format!("chunk {chunk} of the archive body\n").as_bytes());
        data.extend_from_slice(&lcg_bytes(900, chunk));
    }
    let compressed = compress(&data, CompressionLevel::new(1)).unwrap();
    let decompressed = decompress(Cursor::new(compressed)).unwrap();
    assert_eq!(decompressed, data);
}

#[test_log::test]
fn run_heavy_input_uses_fallback_sort_and_roundtrips() {
    // Uniform runs collapse under RLE1 into a short periodic block, which
    // is exactly the input that blows the primary sorting budget and
    // lands in the fallback sorter.
    let data = vec![0x5Au8; 200_000];
    let compressed = compress(&data, CompressionLevel::new(1)).unwrap();
    assert!(
        compressed.len() <= 200,
        "run-heavy input should compress massively, got {} bytes",
        compressed.len()
    );
    let decompressed = decompress(Cursor::new(compressed)).unwrap();
    assert_eq!(decompressed, data);
}

#[test]
fn megabyte_run_compresses_under_200_bytes() {
    let data = vec![0x5Au8; 1_000_000];
    let compressed = compress(&data, CompressionLevel::new(1)).unwrap();
    assert!(
        compressed.len() <= 200,
        "got {} bytes",
        compressed.len()
    );
    let decompressed = decompress(Cursor::new(compressed)).unwrap();
    assert_eq!(decompressed, data);
}

#[test]
fn payload_mutation_is_detected() {
    let data: Vec<u8> = b"checksums protect every block of this stream. "
        .iter()
        .cycle()
        .take(20_000)
        .copied()
        .collect();
    let mut compressed = compress(&data, CompressionLevel::new(1)).unwrap();

    // Flip a byte in the middle of the payload, past the headers.
    let victim = compressed.len() / 2;
    compressed[victim] ^= 0x10;

    let result = decompress(Cursor::new(compressed));
    assert!(
        matches!(
            result,
            Err(FerropackError::ChecksumMismatch { .. }) | Err(FerropackError::CorruptData { .. })
        ),
        "mutation must be caught, got {result:?}"
    );
}

#[test]
fn decoder_read_trait_delivers_partial_reads() {
    let data = b"pull interface delivers bytes at any granularity".repeat(64);
    let compressed = compress(&data, CompressionLevel::new(1)).unwrap();

    let mut decoder = BzDecoder::new(Cursor::new(compressed)).unwrap();
    let mut out = Vec::new();
    let mut chunk = [0u8; 7];
    loop {
        let n = decoder.read(&mut chunk).unwrap();
        if n == 0 {
            break;
        }
        out.extend_from_slice(&chunk[..n]);
    }
    assert_eq!(out, data);
}

#[test]
fn binary_roundtrip_at_high_level() {
    let data = lcg_bytes(60_000, 0xC0FFEE);
    let compressed = compress(&data, CompressionLevel::new(9)).unwrap();
    let decompressed = decompress(Cursor::new(compressed)).unwrap();
    assert_eq!(decompressed, data);
}
