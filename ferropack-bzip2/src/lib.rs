//! BZip2 compression and decompression for Ferropack.
//!
//! BZip2 runs each block through a pipeline of transformations:
//! 1. Run-Length Encoding - runs of 4..=255 bytes get a count byte
//! 2. Burrows-Wheeler Transform - block sorting clusters similar contexts
//! 3. Move-to-Front Transform - repeated symbols become small integers
//! 4. Zero-run encoding - RUNA/RUNB symbols collapse zero runs
//! 5. Multi-table Huffman coding - up to 6 tables, switched every 50 symbols
//!
//! The decoder is a pull-based state machine ([`BzDecoder`] implements
//! `std::io::Read`); the encoder is push-based ([`BzEncoder`] implements
//! `std::io::Write`).
//!
//! # Stream layout
//!
//! ```text
//! "BZh" digit | block ... block | EOS marker | combined CRC
//! ```
//!
//! Each block (bit-granular, not byte-aligned):
//!
//! ```text
//! 0x314159265359 | CRC32 | rand bit | origPtr(24) | usage maps
//! | nGroups(3) | nSelectors(15) | selectors | code lengths | symbols
//! ```
//!
//! The end-of-stream marker is 0x177245385090 followed by the combined
//! CRC: each block CRC folded in by rotate-left-one then XOR.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod blocksort;
mod constants;
mod decode;
mod encode;
mod huffman;

pub use decode::{BzDecoder, decompress};
pub use encode::{BzEncoder, compress};

/// BZip2 stream magic bytes ("BZh").
pub const STREAM_MAGIC: [u8; 3] = [b'B', b'Z', b'h'];

/// Block header magic (0x314159265359).
pub const BLOCK_MAGIC: [u8; 6] = [0x31, 0x41, 0x59, 0x26, 0x53, 0x59];

/// End of stream magic (0x177245385090).
pub const EOS_MAGIC: [u8; 6] = [0x17, 0x72, 0x45, 0x38, 0x50, 0x90];

/// Compression level (1-9); the block size is `level * 100_000` bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionLevel(u8);

impl CompressionLevel {
    /// Create a new compression level (clamped to 1-9).
    pub fn new(level: u8) -> Self {
        Self(level.clamp(1, 9))
    }

    /// Get the block size for this level, in bytes.
    pub fn block_size(&self) -> usize {
        self.0 as usize * 100_000
    }

    /// Get the level value.
    pub fn level(&self) -> u8 {
        self.0
    }
}

impl Default for CompressionLevel {
    fn default() -> Self {
        Self(9)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_compression_level() {
        let level = CompressionLevel::new(5);
        assert_eq!(level.level(), 5);
        assert_eq!(level.block_size(), 500_000);
    }

    #[test]
    fn test_compression_level_clamp() {
        assert_eq!(CompressionLevel::new(0).level(), 1);
        assert_eq!(CompressionLevel::new(10).level(), 9);
    }

    #[test]
    fn test_roundtrip_binary() {
        let mut state = 0xACE1u32;
        let data: Vec<u8> = (0..10_000)
            .map(|_| {
                state = state.wrapping_mul(0x343FD).wrapping_add(0x269EC3);
                (state >> 16) as u8
            })
            .collect();
        let compressed = compress(&data, CompressionLevel::new(1)).unwrap();
        let decompressed = decompress(Cursor::new(compressed)).unwrap();
        assert_eq!(decompressed, data);
    }

    #[test]
    fn test_roundtrip_all_levels() {
        let data: Vec<u8> = b"compression level sweep "
            .iter()
            .cycle()
            .take(4096)
            .copied()
            .collect();
        for level in 1..=9 {
            let compressed = compress(&data, CompressionLevel::new(level)).unwrap();
            let decompressed = decompress(Cursor::new(compressed)).unwrap();
            assert_eq!(decompressed, data, "level {level}");
        }
    }
}
