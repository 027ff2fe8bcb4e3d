//! Crafted-stream tests for the wire format and engine states.

use ferropack_core::FerropackError;
use ferropack_deflate::{Deflater, Inflater, deflate, inflate, zlib_compress, zlib_decompress};

/// Pack a bit sequence LSB-first into bytes.
fn pack_bits(bits: &[u8]) -> Vec<u8> {
    let mut bytes = vec![0u8; bits.len().div_ceil(8)];
    for (i, &bit) in bits.iter().enumerate() {
        if bit != 0 {
            bytes[i / 8] |= 1 << (i % 8);
        }
    }
    bytes
}

#[test]
fn dynamic_header_first_symbol_cannot_be_repeat() {
    // BFINAL=1, BTYPE=10 (dynamic), HLIT=0, HDIST=0, HCLEN=15 (all 19
    // code-length codes present, 1 bit each for symbols 16 and 17, zeros
    // for the rest would be over-subscribed, so give 16 and 17 length 1).
    let mut bits: Vec<u8> = Vec::new();
    bits.extend_from_slice(&[1, 0, 1]); // final, dynamic
    bits.extend_from_slice(&[0, 0, 0, 0, 0]); // HLIT = 257
    bits.extend_from_slice(&[0, 0, 0, 0, 0]); // HDIST = 1
    bits.extend_from_slice(&[1, 1, 1, 1]); // HCLEN = 19
    // Code-length code lengths in BL_ORDER 16,17,18,0,8,...: give 16 and
    // 17 one bit each, everything else zero.
    bits.extend_from_slice(&[1, 0, 0]); // len(16) = 1
    bits.extend_from_slice(&[1, 0, 0]); // len(17) = 1
    for _ in 0..17 {
        bits.extend_from_slice(&[0, 0, 0]);
    }
    // First code-length symbol: 16 (copy previous) with no previous.
    bits.push(0); // code for symbol 16 (canonical 0, 1 bit)
    bits.extend_from_slice(&[0, 0]); // repeat extra bits

    let data = pack_bits(&bits);
    let result = inflate(&data);
    assert!(
        matches!(result, Err(FerropackError::CorruptData { .. })),
        "got {result:?}"
    );
}

#[test]
fn oversubscribed_code_lengths_rejected() {
    // Dynamic block whose code-length code claims three 1-bit codes.
    let mut bits: Vec<u8> = Vec::new();
    bits.extend_from_slice(&[1, 0, 1]);
    bits.extend_from_slice(&[0, 0, 0, 0, 0]);
    bits.extend_from_slice(&[0, 0, 0, 0, 0]);
    bits.extend_from_slice(&[1, 1, 1, 1]); // HCLEN = 19
    // 16, 17, 18 all get length 1: over-subscribed.
    bits.extend_from_slice(&[1, 0, 0]);
    bits.extend_from_slice(&[1, 0, 0]);
    bits.extend_from_slice(&[1, 0, 0]);
    for _ in 0..16 {
        bits.extend_from_slice(&[0, 0, 0]);
    }

    let data = pack_bits(&bits);
    assert!(matches!(
        inflate(&data),
        Err(FerropackError::CorruptData { .. })
    ));
}

#[test]
fn distance_too_far_back_is_corrupt() {
    // Static block: literal 'A', then length 3 / distance 2 with only one
    // byte of history.
    let mut bits: Vec<u8> = Vec::new();
    bits.extend_from_slice(&[1, 1, 0]); // final, static
    let push_code = |bits: &mut Vec<u8>, code: u16, len: u32| {
        for i in (0..len).rev() {
            bits.push(((code >> i) & 1) as u8);
        }
    };
    push_code(&mut bits, 0x30 + 0x41, 8); // literal 'A'
    push_code(&mut bits, 1, 7); // symbol 257 = length 3
    push_code(&mut bits, 1, 5); // distance symbol 1 = distance 2
    push_code(&mut bits, 0, 7); // EOB

    let data = pack_bits(&bits);
    assert!(matches!(
        inflate(&data),
        Err(FerropackError::CorruptData { .. })
    ));
}

#[test]
fn inflater_reset_allows_reuse() {
    let first = zlib_compress(b"first stream", 6).unwrap();
    let second = zlib_compress(b"second stream, different content", 9).unwrap();

    let mut inflater = Inflater::new(false);
    let mut out = vec![0u8; 256];

    inflater.set_input(&first).unwrap();
    let n = inflater.inflate(&mut out).unwrap();
    assert_eq!(&out[..n], b"first stream");
    assert!(inflater.is_finished());

    inflater.reset();
    inflater.set_input(&second).unwrap();
    let n = inflater.inflate(&mut out).unwrap();
    assert_eq!(&out[..n], b"second stream, different content");
    assert!(inflater.is_finished());
}

#[test]
fn deflater_reset_allows_reuse() {
    let mut deflater = Deflater::new(6, true);
    let mut buf = [0u8; 4096];

    for round in 0..3 {
        let data = format!("round {round} payload ").repeat(50);
        deflater.set_input(data.as_bytes()).unwrap();
        deflater.finish();
        let mut compressed = Vec::new();
        while !deflater.is_finished() {
            let n = deflater.deflate(&mut buf).unwrap();
            compressed.extend_from_slice(&buf[..n]);
        }
        assert_eq!(inflate(&compressed).unwrap(), data.as_bytes());
        deflater.reset();
    }
}

#[test]
fn sync_flush_makes_data_decodable_mid_stream() {
    let mut deflater = Deflater::new(6, true);
    let mut buf = [0u8; 4096];
    let mut compressed = Vec::new();

    deflater.set_input(b"part one of the stream ").unwrap();
    deflater.flush();
    loop {
        let n = deflater.deflate(&mut buf).unwrap();
        if n == 0 {
            break;
        }
        compressed.extend_from_slice(&buf[..n]);
    }

    // Everything flushed so far decodes on its own (stream unterminated,
    // so drive the inflater manually).
    let mut inflater = Inflater::new(true);
    inflater.set_input(&compressed).unwrap();
    let mut out = vec![0u8; 256];
    let n = inflater.inflate(&mut out).unwrap();
    assert_eq!(&out[..n], b"part one of the stream ");

    deflater.set_input(b"and part two").unwrap();
    deflater.finish();
    loop {
        let n = deflater.deflate(&mut buf).unwrap();
        if n == 0 && deflater.is_finished() {
            break;
        }
        compressed.extend_from_slice(&buf[..n]);
    }
    assert_eq!(
        inflate(&compressed).unwrap(),
        b"part one of the stream and part two"
    );
}

#[test]
fn empty_zlib_reference_stream_decodes() {
    assert_eq!(
        zlib_decompress(&[0x78, 0x9C, 0x03, 0x00, 0x00, 0x00, 0x00, 0x01]).unwrap(),
        Vec::<u8>::new()
    );
}

#[test]
fn stored_blocks_chain_across_64k() {
    // Level 0 splits anything over 65535 bytes into several stored blocks.
    let data: Vec<u8> = (0..200_000u32).map(|i| (i % 256) as u8).collect();
    let compressed = deflate(&data, 0).unwrap();
    assert!(compressed.len() > data.len());
    assert_eq!(inflate(&compressed).unwrap(), data);
}
