//! BZip2 encoder.
//!
//! `BzEncoder` accepts bytes through a push interface, run-length folds
//! them into the block buffer, and on each full block runs the
//! BWT / MTF / multi-table Huffman pipeline and emits the block bit stream.
//!
//! Block sorting is budgeted: if the primary suffix sort exceeds its work
//! limit (highly repetitive blocks defeat its depth-bounded comparisons),
//! the block is re-sorted with the unbudgeted doubling sorter instead. The
//! emitted stream is a normal non-randomised block either way; the
//! randomised flag exists for old streams and is only ever consumed by the
//! decoder.

use crate::blocksort::{BlockSorter, fallback_sort};
use crate::constants::{
    GROUP_SIZE, MAX_ALPHA_SIZE, MAX_CODE_LEN, MAX_GROUPS, NUM_ITERS, OVERSHOOT_BYTES,
};
use crate::huffman::{assign_codes, make_code_lengths};
use crate::{BLOCK_MAGIC, CompressionLevel, EOS_MAGIC, STREAM_MAGIC};
use ferropack_core::error::{FerropackError, Result};
use ferropack_core::{BitWriter, StreamCrc32};
use std::io::Write;

/// Sorting work allowed per block, as a multiple of the block length.
const WORK_FACTOR: i64 = 50;

/// Symbol cost used to seed tables towards their initial alphabet region.
const LESSER_ICOST: u8 = 0;
const GREATER_ICOST: u8 = 15;

/// Streaming BZip2 encoder.
pub struct BzEncoder<W: Write> {
    bits: BitWriter<W>,
    /// Block capacity in bytes (level * 100_000).
    limit_last: usize,
    /// Fill threshold; the slack leaves room for one run plus overshoot.
    allowable: i32,

    // Run-length front end
    current_byte: i32,
    run_length: i32,

    // Block state
    block: Vec<u8>,
    fmap: Vec<i32>,
    last: i32,
    in_use: [bool; 256],
    block_crc: StreamCrc32,
    combined_crc: u32,

    finished: bool,
}

impl<W: Write> BzEncoder<W> {
    /// Create an encoder and write the 4-byte stream header.
    pub fn new(writer: W, level: CompressionLevel) -> Result<Self> {
        let mut bits = BitWriter::new(writer);
        for &byte in &STREAM_MAGIC {
            bits.write_bits(u32::from(byte), 8)?;
        }
        bits.write_bits(u32::from(b'0' + level.level()), 8)?;

        let limit_last = level.block_size();
        Ok(Self {
            bits,
            limit_last,
            allowable: (limit_last - 20) as i32,
            current_byte: -1,
            run_length: 0,
            block: vec![0u8; limit_last + OVERSHOOT_BYTES + 1],
            fmap: Vec::new(),
            last: -1,
            in_use: [false; 256],
            block_crc: StreamCrc32::new(),
            combined_crc: 0,
            finished: false,
        })
    }

    /// Push a single byte into the encoder.
    pub fn write_byte(&mut self, byte: u8) -> Result<()> {
        if self.finished {
            return Err(FerropackError::invalid_parameter(
                "write after finish",
            ));
        }
        let b = i32::from(byte);
        if self.run_length == 0 {
            self.current_byte = b;
            self.run_length = 1;
        } else if self.current_byte == b {
            self.run_length += 1;
            if self.run_length > 254 {
                self.write_run()?;
                self.current_byte = -1;
                self.run_length = 0;
            }
        } else {
            self.write_run()?;
            self.current_byte = b;
            self.run_length = 1;
        }
        Ok(())
    }

    /// Push a slice of bytes into the encoder.
    pub fn write_all_bytes(&mut self, data: &[u8]) -> Result<()> {
        for &byte in data {
            self.write_byte(byte)?;
        }
        Ok(())
    }

    /// Flush the pending run, emit the final block, the end-of-stream
    /// marker and the combined CRC, and return the underlying writer.
    pub fn finish(mut self) -> Result<W> {
        self.do_finish()?;
        let this = std::mem::ManuallyDrop::new(self);
        // SAFETY: self is consumed and Drop is suppressed, so reading the
        // bit writer out does not duplicate ownership.
        let bits = unsafe { std::ptr::read(&this.bits) };
        bits.into_inner()
    }

    fn do_finish(&mut self) -> Result<()> {
        if self.finished {
            return Err(FerropackError::invalid_parameter("finish called twice"));
        }
        if self.run_length > 0 {
            self.write_run()?;
        }
        self.current_byte = -1;
        if self.last >= 0 {
            self.end_block()?;
        }
        for &byte in &EOS_MAGIC {
            self.bits.write_bits(u32::from(byte), 8)?;
        }
        self.bits.write_u32(self.combined_crc)?;
        self.bits.flush()?;
        self.finished = true;
        Ok(())
    }

    /// Fold the pending run into the block, applying the first run-length
    /// layer (runs of 4 get an extra count byte).
    fn write_run(&mut self) -> Result<()> {
        if self.last >= self.allowable {
            self.end_block()?;
        }

        let byte = self.current_byte as u8;
        self.in_use[byte as usize] = true;
        for _ in 0..self.run_length {
            self.block_crc.update_byte(byte);
        }

        match self.run_length {
            1..=3 => {
                for _ in 0..self.run_length {
                    self.last += 1;
                    self.block[self.last as usize] = byte;
                }
            }
            _ => {
                let count = (self.run_length - 4) as u8;
                self.in_use[count as usize] = true;
                for _ in 0..4 {
                    self.last += 1;
                    self.block[self.last as usize] = byte;
                }
                self.last += 1;
                self.block[self.last as usize] = count;
            }
        }
        Ok(())
    }

    /// Compress and emit the current block, then reset block state.
    fn end_block(&mut self) -> Result<()> {
        if self.last < 0 {
            return Ok(());
        }

        let block_crc = self.block_crc.value();
        self.combined_crc = self.combined_crc.rotate_left(1) ^ block_crc;

        let orig_ptr = self.sort_block()?;

        for &byte in &BLOCK_MAGIC {
            self.bits.write_bits(u32::from(byte), 8)?;
        }
        self.bits.write_u32(block_crc)?;
        // Randomised flag: budget overruns take the fallback sorter, so
        // the encoder never needs the randomisation escape hatch.
        self.bits.write_bit(false)?;
        self.bits.write_bits(orig_ptr, 24)?;

        let (mtf, mtf_freq, n_in_use) = self.generate_mtf_values();
        self.send_mtf_values(&mtf, &mtf_freq, n_in_use)?;

        // Reset for the next block.
        self.last = -1;
        self.in_use = [false; 256];
        self.block_crc.reset();
        Ok(())
    }

    /// Suffix-sort the block, switching to the fallback sorter if the
    /// primary sort exceeds its work budget. Returns the BWT origin
    /// pointer.
    fn sort_block(&mut self) -> Result<u32> {
        let n = (self.last + 1) as usize;
        for i in 0..OVERSHOOT_BYTES {
            self.block[n + i] = self.block[i % n];
        }
        self.fmap.clear();
        self.fmap.resize(n, 0);

        let work_limit = WORK_FACTOR * i64::from(self.last);
        let sorted = {
            let mut sorter = BlockSorter::new(&self.block, &mut self.fmap, n, work_limit);
            sorter.sort()
        };
        if !sorted {
            log::debug!("sort budget exceeded after {n} bytes; using fallback sorter");
            fallback_sort(&self.block[..n], &mut self.fmap, n);
        }

        let orig_ptr = self
            .fmap
            .iter()
            .position(|&p| p == 0)
            .ok_or_else(|| FerropackError::internal("rank-0 suffix missing after sort"))?;
        Ok(orig_ptr as u32)
    }

    /// Walk the sorted suffixes emitting the move-to-front transform of the
    /// BWT last column, with zero runs collapsed into RUNA/RUNB symbols.
    ///
    /// Returns the symbol stream, per-symbol frequencies, and the live
    /// alphabet size.
    fn generate_mtf_values(&mut self) -> (Vec<u16>, [i32; MAX_ALPHA_SIZE], usize) {
        // Map live byte values to dense symbol indices.
        let mut unseq_to_seq = [0u8; 256];
        let mut n_in_use = 0usize;
        for i in 0..256 {
            if self.in_use[i] {
                unseq_to_seq[i] = n_in_use as u8;
                n_in_use += 1;
            }
        }

        let eob = (n_in_use + 1) as u16;
        let n = (self.last + 1) as usize;
        let mut mtf = Vec::with_capacity(n / 2 + 16);
        let mut mtf_freq = [0i32; MAX_ALPHA_SIZE];
        let mut yy: [u8; 256] = std::array::from_fn(|i| i as u8);

        let mut z_pend: u64 = 0;
        let mut flush_zeros = |z_pend: &mut u64, mtf: &mut Vec<u16>, freq: &mut [i32]| {
            if *z_pend == 0 {
                return;
            }
            let mut zp = *z_pend - 1;
            loop {
                if zp & 1 == 1 {
                    mtf.push(crate::constants::RUN_B);
                    freq[crate::constants::RUN_B as usize] += 1;
                } else {
                    mtf.push(crate::constants::RUN_A);
                    freq[crate::constants::RUN_A as usize] += 1;
                }
                if zp < 2 {
                    break;
                }
                zp = (zp - 2) / 2;
            }
            *z_pend = 0;
        };

        for i in 0..n {
            // BWT last column: the byte preceding this sorted rotation.
            let mut j = self.fmap[i] - 1;
            if j < 0 {
                j += n as i32;
            }
            let ll_i = unseq_to_seq[self.block[j as usize] as usize];

            // Move-to-front over the live alphabet.
            let mut pos = 0usize;
            while yy[pos] != ll_i {
                pos += 1;
            }
            yy.copy_within(0..pos, 1);
            yy[0] = ll_i;

            if pos == 0 {
                z_pend += 1;
            } else {
                flush_zeros(&mut z_pend, &mut mtf, &mut mtf_freq);
                let sym = (pos + 1) as u16;
                mtf.push(sym);
                mtf_freq[sym as usize] += 1;
            }
        }
        flush_zeros(&mut z_pend, &mut mtf, &mut mtf_freq);

        mtf.push(eob);
        mtf_freq[eob as usize] += 1;

        (mtf, mtf_freq, n_in_use)
    }

    /// Pick coding tables, refine them over the symbol stream, and emit the
    /// alphabet map, selectors, code lengths and the coded symbols.
    fn send_mtf_values(
        &mut self,
        mtf: &[u16],
        mtf_freq: &[i32; MAX_ALPHA_SIZE],
        n_in_use: usize,
    ) -> Result<()> {
        let alpha_size = n_in_use + 2;
        let n_mtf = mtf.len();

        let n_groups = match n_mtf {
            0..200 => 2,
            200..600 => 3,
            600..1200 => 4,
            1200..2400 => 5,
            _ => 6,
        };
        log::debug!("{n_mtf} MTF symbols, {n_groups} coding tables");

        // Seed each table with a contiguous frequency region: cheap inside,
        // expensive outside.
        let mut len = [[GREATER_ICOST; MAX_ALPHA_SIZE]; MAX_GROUPS];
        let mut rem_f = n_mtf as i32;
        let mut gs = 0usize;
        for n_part in (1..=n_groups).rev() {
            let t_freq = rem_f / n_part as i32;
            let mut ge = gs as i32 - 1;
            let mut a_freq = 0i32;
            while a_freq < t_freq && ge < alpha_size as i32 - 1 {
                ge += 1;
                a_freq += mtf_freq[ge as usize];
            }
            if ge > gs as i32
                && n_part != n_groups
                && n_part != 1
                && (n_groups - n_part) % 2 == 1
            {
                a_freq -= mtf_freq[ge as usize];
                ge -= 1;
            }
            for (v, slot) in len[n_part - 1][..alpha_size].iter_mut().enumerate() {
                *slot = if v >= gs && v as i32 <= ge {
                    LESSER_ICOST
                } else {
                    GREATER_ICOST
                };
            }
            gs = (ge + 1) as usize;
            rem_f -= a_freq;
        }

        // Refine: assign each 50-symbol group to its cheapest table, then
        // rebuild every table from the frequencies it actually won.
        let mut selectors: Vec<u8> = Vec::with_capacity(n_mtf / GROUP_SIZE + 1);
        for _ in 0..NUM_ITERS {
            let mut rfreq = [[0i32; MAX_ALPHA_SIZE]; MAX_GROUPS];
            selectors.clear();

            let mut gs = 0usize;
            while gs < n_mtf {
                let ge = (gs + GROUP_SIZE).min(n_mtf);

                let mut cost = [0u32; MAX_GROUPS];
                for &sym in &mtf[gs..ge] {
                    for (t, c) in cost.iter_mut().enumerate().take(n_groups) {
                        *c += u32::from(len[t][sym as usize]);
                    }
                }
                let mut bt = 0usize;
                for t in 1..n_groups {
                    if cost[t] < cost[bt] {
                        bt = t;
                    }
                }
                selectors.push(bt as u8);
                for &sym in &mtf[gs..ge] {
                    rfreq[bt][sym as usize] += 1;
                }
                gs = ge;
            }

            for t in 0..n_groups {
                make_code_lengths(&mut len[t], &rfreq[t], alpha_size, MAX_CODE_LEN);
            }
        }

        // Selectors are transmitted move-to-front coded in unary.
        let mut pos: [u8; MAX_GROUPS] = std::array::from_fn(|i| i as u8);
        let mut selector_mtf = Vec::with_capacity(selectors.len());
        for &sel in &selectors {
            let mut j = 0usize;
            while pos[j] != sel {
                j += 1;
            }
            pos.copy_within(0..j, 1);
            pos[0] = sel;
            selector_mtf.push(j as u8);
        }

        // Canonical codes per table.
        let mut codes = [[0u32; MAX_ALPHA_SIZE]; MAX_GROUPS];
        for t in 0..n_groups {
            let min_len = *len[t][..alpha_size].iter().min().unwrap_or(&1);
            let max_len = *len[t][..alpha_size].iter().max().unwrap_or(&1);
            assign_codes(&mut codes[t][..alpha_size], &len[t][..alpha_size], min_len, max_len);
        }

        // Alphabet map: coarse 16-bit word, then one fine word per set slot.
        let mut coarse = 0u32;
        for i in 0..16 {
            if self.in_use[i * 16..(i + 1) * 16].iter().any(|&u| u) {
                coarse |= 0x8000 >> i;
            }
        }
        self.bits.write_bits(coarse, 16)?;
        for i in 0..16 {
            if coarse & (0x8000 >> i) != 0 {
                let mut fine = 0u32;
                for j in 0..16 {
                    if self.in_use[i * 16 + j] {
                        fine |= 0x8000 >> j;
                    }
                }
                self.bits.write_bits(fine, 16)?;
            }
        }

        self.bits.write_bits(n_groups as u32, 3)?;
        self.bits.write_bits(selectors.len() as u32, 15)?;
        for &j in &selector_mtf {
            for _ in 0..j {
                self.bits.write_bit(true)?;
            }
            self.bits.write_bit(false)?;
        }

        // Code lengths, delta-coded from the previous symbol's length.
        for t in 0..n_groups {
            let mut curr = i32::from(len[t][0]);
            self.bits.write_bits(curr as u32, 5)?;
            for &l in &len[t][..alpha_size] {
                let target = i32::from(l);
                while curr < target {
                    self.bits.write_bits(0b10, 2)?;
                    curr += 1;
                }
                while curr > target {
                    self.bits.write_bits(0b11, 2)?;
                    curr -= 1;
                }
                self.bits.write_bit(false)?;
            }
        }

        // The symbol stream itself, switching tables every 50 symbols.
        let mut gs = 0usize;
        let mut sel_no = 0usize;
        while gs < n_mtf {
            let ge = (gs + GROUP_SIZE).min(n_mtf);
            let t = selectors[sel_no] as usize;
            sel_no += 1;
            for &sym in &mtf[gs..ge] {
                self.bits
                    .write_bits(codes[t][sym as usize], u32::from(len[t][sym as usize]))?;
            }
            gs = ge;
        }

        Ok(())
    }
}

impl<W: Write> Write for BzEncoder<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self.write_all_bytes(buf) {
            Ok(()) => Ok(buf.len()),
            Err(FerropackError::Io(e)) => Err(e),
            Err(e) => Err(std::io::Error::new(std::io::ErrorKind::InvalidInput, e)),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        // Data is only byte-aligned at block boundaries; nothing useful can
        // be flushed mid-block.
        Ok(())
    }
}

impl<W: Write> Drop for BzEncoder<W> {
    fn drop(&mut self) {
        if !self.finished {
            // Best-effort: emit what we can so the sink is not left
            // mid-bit-stream.
            let _ = self.do_finish();
        }
    }
}

/// Compress data into a BZip2 stream.
pub fn compress(data: &[u8], level: CompressionLevel) -> Result<Vec<u8>> {
    let mut encoder = BzEncoder::new(Vec::new(), level)?;
    encoder.write_all_bytes(data)?;
    encoder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::decompress;
    use std::io::Cursor;

    #[test]
    fn test_empty_stream_is_14_bytes() {
        let compressed = compress(b"", CompressionLevel::new(1)).unwrap();
        assert_eq!(compressed.len(), 14);
        assert_eq!(&compressed[..4], b"BZh1");
        assert_eq!(decompress(Cursor::new(compressed)).unwrap(), b"");
    }

    #[test]
    fn test_single_byte_roundtrip() {
        let compressed = compress(b"a", CompressionLevel::new(1)).unwrap();
        let decompressed = decompress(Cursor::new(compressed)).unwrap();
        assert_eq!(decompressed, b"a");
    }

    #[test]
    fn test_text_roundtrip() {
        let data = b"The quick brown fox jumps over the lazy dog. \
                     The quick brown fox jumps over the lazy dog.";
        let compressed = compress(data, CompressionLevel::new(1)).unwrap();
        let decompressed = decompress(Cursor::new(compressed)).unwrap();
        assert_eq!(decompressed, data);
    }

    #[test]
    fn test_finish_twice_rejected() {
        let mut encoder = BzEncoder::new(Vec::new(), CompressionLevel::new(1)).unwrap();
        encoder.write_byte(b'x').unwrap();
        assert!(encoder.do_finish().is_ok());
        assert!(matches!(
            encoder.do_finish(),
            Err(FerropackError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_run_length_cap() {
        // 300 equal bytes exercise the 255 run cap and the count-byte path.
        let data = vec![0x42u8; 300];
        let compressed = compress(&data, CompressionLevel::new(1)).unwrap();
        let decompressed = decompress(Cursor::new(compressed)).unwrap();
        assert_eq!(decompressed, data);
    }
}
