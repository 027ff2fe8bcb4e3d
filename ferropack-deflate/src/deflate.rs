//! The public deflater engine.
//!
//! `Deflater` drives the match-finding engine and the Huffman coder, and
//! frames the result either as raw DEFLATE or as a zlib stream. Like the
//! inflater it is cooperative: `deflate` returns however many bytes fit,
//! and 0 means the engine wants more input or is finished.
//!
//! # zlib framing (RFC 1950)
//!
//! ```text
//! +---+---+=====================+---+---+---+---+
//! |CMF|FLG| DEFLATE block data  |    ADLER32    |
//! +---+---+=====================+---+---+---+---+
//! ```
//!
//! - CMF: method 8 in the low nibble, log2(window) - 8 in the high nibble
//! - FLG: check bits so `(CMF * 256 + FLG) % 31 == 0`, the preset
//!   dictionary bit, and a 2-bit compression-level hint
//! - ADLER32: big-endian checksum of the uncompressed data, written after
//!   the final block is byte-aligned

use crate::engine::{DeflateStrategy, DeflaterEngine};
use ferropack_core::error::{FerropackError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Header not yet written (zlib) / nothing processed (raw).
    Init,
    /// Compressing.
    Busy,
    /// Final block and trailer written; pending may still hold bytes.
    Finished,
}

/// Streaming DEFLATE compressor.
pub struct Deflater {
    engine: DeflaterEngine,
    level: u8,
    raw: bool,
    phase: Phase,
    is_flushing: bool,
    is_finishing: bool,
    dict_adler: Option<u32>,
    total_out: u64,
}

impl Deflater {
    /// Create a deflater. `level` 0 stores, 1..=3 compress greedily,
    /// 4..=9 compress with lazy matching. `raw` omits the zlib wrapper.
    pub fn new(level: u8, raw: bool) -> Self {
        Self {
            engine: DeflaterEngine::new(level.min(9)),
            level: level.min(9),
            raw,
            phase: Phase::Init,
            is_flushing: false,
            is_finishing: false,
            dict_adler: None,
            total_out: 0,
        }
    }

    /// Supply more uncompressed input.
    pub fn set_input(&mut self, data: &[u8]) -> Result<()> {
        if self.is_finishing {
            return Err(FerropackError::invalid_parameter(
                "input after finish was requested",
            ));
        }
        self.engine.set_input(data)
    }

    /// True when all supplied input has been consumed.
    pub fn needs_input(&self) -> bool {
        self.engine.needs_input()
    }

    /// Change the compression level between blocks.
    pub fn set_level(&mut self, level: u8) {
        self.level = level.min(9);
        self.engine.set_level(self.level);
    }

    /// Change the match-emission strategy.
    pub fn set_strategy(&mut self, strategy: DeflateStrategy) {
        self.engine.set_strategy(strategy);
    }

    /// Preset a dictionary. Only valid before any data is compressed.
    pub fn set_dictionary(&mut self, dictionary: &[u8]) -> Result<()> {
        if self.phase != Phase::Init {
            return Err(FerropackError::invalid_parameter(
                "dictionary must be set before compression starts",
            ));
        }
        self.engine.set_dictionary(dictionary);
        self.dict_adler = Some(self.engine.adler.value());
        self.engine.adler.reset();
        Ok(())
    }

    /// Request the end of the stream: remaining input is compressed, the
    /// final block is marked last, and the zlib trailer is appended.
    pub fn finish(&mut self) {
        self.is_flushing = true;
        self.is_finishing = true;
    }

    /// Emit all pending symbols and align the stream so everything written
    /// so far can be decoded.
    pub fn flush(&mut self) {
        self.is_flushing = true;
    }

    /// True when the stream is complete and fully drained.
    pub fn is_finished(&self) -> bool {
        self.phase == Phase::Finished && self.engine.huffman.pending.is_flushed()
    }

    /// Adler-32 of all consumed input.
    pub fn adler(&self) -> u32 {
        self.engine.adler.value()
    }

    /// Total uncompressed bytes consumed.
    pub fn total_in(&self) -> u64 {
        self.engine.total_in
    }

    /// Total compressed bytes produced.
    pub fn total_out(&self) -> u64 {
        self.total_out
    }

    /// Reset for a fresh stream with the same parameters.
    pub fn reset(&mut self) {
        self.engine.reset();
        self.phase = Phase::Init;
        self.is_flushing = false;
        self.is_finishing = false;
        self.dict_adler = None;
        self.total_out = 0;
    }

    /// Compress into `out`, returning the bytes produced. 0 means more
    /// input is needed (or the stream is finished).
    pub fn deflate(&mut self, out: &mut [u8]) -> Result<usize> {
        if self.phase == Phase::Init {
            self.write_header();
            self.phase = Phase::Busy;
        }

        let mut written = 0;
        loop {
            written += self
                .engine
                .huffman
                .pending
                .flush_into(&mut out[written..]);
            if written == out.len() {
                break;
            }
            if self.phase == Phase::Finished {
                break;
            }

            if !self.engine.deflate(self.is_flushing, self.is_finishing) {
                if self.is_finishing {
                    let pending = &mut self.engine.huffman.pending;
                    pending.align_to_byte();
                    if !self.raw {
                        let adler = self.engine.adler.value();
                        pending.write_short_msb((adler >> 16) as u16);
                        pending.write_short_msb((adler & 0xFFFF) as u16);
                    }
                    self.phase = Phase::Finished;
                } else if self.is_flushing {
                    // Pad with empty static blocks until byte-aligned, so
                    // every symbol so far is decodable.
                    if self.level > 0 {
                        let pending = &mut self.engine.huffman.pending;
                        let mut needed =
                            8 + (8u32.wrapping_sub(pending.bit_count()) & 7) as i32;
                        while needed > 0 {
                            pending.write_bits(2, 10);
                            needed -= 10;
                        }
                    }
                    self.is_flushing = false;
                } else {
                    break;
                }
            }
        }
        self.total_out += written as u64;
        Ok(written)
    }

    fn write_header(&mut self) {
        if self.raw {
            return;
        }
        // CMF: method 8, 32 KiB window. FLG: level hint, dictionary bit,
        // and a check value making the pair divisible by 31.
        let cmf = 0x78u16;
        let level_flags = u16::from((self.level.saturating_sub(1)) >> 1).min(3);
        let mut header = (cmf << 8) | (level_flags << 6);
        if self.dict_adler.is_some() {
            header |= 0x20;
        }
        header += 31 - header % 31;
        let pending = &mut self.engine.huffman.pending;
        pending.write_short_msb(header);
        if let Some(id) = self.dict_adler {
            pending.write_short_msb((id >> 16) as u16);
            pending.write_short_msb((id & 0xFFFF) as u16);
        }
    }
}

/// Compress a whole buffer as raw DEFLATE.
pub fn deflate(data: &[u8], level: u8) -> Result<Vec<u8>> {
    deflate_with(data, level, true)
}

/// Compress a whole buffer as a zlib stream.
pub fn zlib_compress(data: &[u8], level: u8) -> Result<Vec<u8>> {
    deflate_with(data, level, false)
}

fn deflate_with(data: &[u8], level: u8, raw: bool) -> Result<Vec<u8>> {
    let mut deflater = Deflater::new(level, raw);
    deflater.set_input(data)?;
    deflater.finish();
    let mut output = Vec::new();
    let mut buf = [0u8; 16 * 1024];
    while !deflater.is_finished() {
        let n = deflater.deflate(&mut buf)?;
        output.extend_from_slice(&buf[..n]);
        if n == 0 && !deflater.is_finished() {
            return Err(FerropackError::internal("deflater stalled"));
        }
    }
    Ok(output)
}
