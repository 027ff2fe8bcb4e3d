//! BZip2 decoder.
//!
//! `BzDecoder` wraps any byte source and yields decompressed bytes through
//! a pull interface (`read_byte` / `std::io::Read`). Decoding is a state
//! machine: after a block's Huffman, MTF and BWT stages are undone into
//! `ll8`/`tt`, the final run-length layer is expanded one byte per step so
//! the caller can pull at any granularity.

use crate::constants::{
    GROUP_SIZE, MAX_ALPHA_SIZE, MAX_CODE_LEN, MAX_GROUPS, MAX_SELECTORS, RAND_NUMBERS, RUN_A,
    RUN_B,
};
use crate::huffman::DecodeTables;
use crate::{BLOCK_MAGIC, EOS_MAGIC, STREAM_MAGIC};
use ferropack_core::error::{FerropackError, Result};
use ferropack_core::{BitReader, StreamCrc32};
use std::io::Read;

/// Decoder state. `StartBlock` parses the next block (or the end-of-stream
/// marker); the part A/B/C states walk the run-length layer, with the
/// `Rand*` variants additionally undoing block randomisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    StartBlock,
    RandPartA,
    RandPartB,
    RandPartC,
    NoRandPartA,
    NoRandPartB,
    NoRandPartC,
    Eof,
}

/// Streaming BZip2 decoder.
pub struct BzDecoder<R: Read> {
    bits: BitReader<R>,
    /// Block capacity in bytes (level * 100_000).
    limit_last: usize,

    // Per-block data
    ll8: Vec<u8>,
    tt: Vec<u32>,
    unzftab: [i32; 256],
    in_use: [bool; 256],
    seq_to_unseq: [u8; 256],
    n_in_use: usize,
    selectors: Vec<u8>,
    groups: Vec<DecodeTables>,
    group_no: i32,
    group_pos: usize,

    // Run-length machine registers
    state: State,
    last: i32,
    t_pos: u32,
    ch2: i32,
    ch_prev: i32,
    count: i32,
    i2: i32,
    j2: i32,
    z: u8,
    rn_to_go: i32,
    r_t_pos: usize,

    block_crc: StreamCrc32,
    stored_block_crc: u32,
    computed_combined_crc: u32,
}

impl<R: Read> BzDecoder<R> {
    /// Create a decoder, consuming and validating the 4-byte stream header.
    pub fn new(reader: R) -> Result<Self> {
        let mut bits = BitReader::new(reader);

        for &expected in &STREAM_MAGIC {
            let got = bits.read_bits(8)? as u8;
            if got != expected {
                return Err(FerropackError::corrupt("bad stream magic"));
            }
        }
        let level = bits.read_bits(8)? as u8;
        if !(b'1'..=b'9').contains(&level) {
            return Err(FerropackError::corrupt(format!(
                "bad block size digit {level:#04x}"
            )));
        }
        let limit_last = (level - b'0') as usize * 100_000;

        Ok(Self {
            bits,
            limit_last,
            ll8: Vec::new(),
            tt: Vec::new(),
            unzftab: [0; 256],
            in_use: [false; 256],
            seq_to_unseq: [0; 256],
            n_in_use: 0,
            selectors: Vec::new(),
            groups: Vec::new(),
            group_no: -1,
            group_pos: 0,
            state: State::StartBlock,
            last: -1,
            t_pos: 0,
            ch2: 256,
            ch_prev: 256,
            count: 0,
            i2: 0,
            j2: 0,
            z: 0,
            rn_to_go: 0,
            r_t_pos: 0,
            block_crc: StreamCrc32::new(),
            stored_block_crc: 0,
            computed_combined_crc: 0,
        })
    }

    /// The block size this stream was encoded with, in bytes.
    pub fn block_size(&self) -> usize {
        self.limit_last
    }

    /// Pull the next decompressed byte, or `None` at end of stream.
    pub fn read_byte(&mut self) -> Result<Option<u8>> {
        loop {
            match self.state {
                State::Eof => return Ok(None),

                State::StartBlock => {
                    if !self.init_block()? {
                        self.state = State::Eof;
                        return Ok(None);
                    }
                }

                State::RandPartA | State::NoRandPartA => {
                    let rand = self.state == State::RandPartA;
                    if self.i2 <= self.last {
                        self.ch_prev = self.ch2;
                        let mut ch = self.bwt_next()?;
                        if rand {
                            ch ^= self.rand_bit();
                        }
                        self.ch2 = i32::from(ch);
                        self.i2 += 1;
                        self.block_crc.update_byte(ch);
                        self.state = if rand {
                            State::RandPartB
                        } else {
                            State::NoRandPartB
                        };
                        return Ok(Some(ch));
                    } else {
                        self.end_block()?;
                        self.state = State::StartBlock;
                    }
                }

                State::RandPartB | State::NoRandPartB => {
                    let rand = self.state == State::RandPartB;
                    if self.ch2 != self.ch_prev {
                        self.count = 1;
                    } else {
                        self.count += 1;
                        if self.count >= 4 {
                            // Four equal bytes: the next position holds the
                            // extra repeat count.
                            let mut z = self.bwt_next()?;
                            if rand {
                                z ^= self.rand_bit();
                            }
                            self.z = z;
                            self.j2 = 0;
                            self.state = if rand {
                                State::RandPartC
                            } else {
                                State::NoRandPartC
                            };
                            continue;
                        }
                    }
                    self.state = if rand {
                        State::RandPartA
                    } else {
                        State::NoRandPartA
                    };
                }

                State::RandPartC | State::NoRandPartC => {
                    if self.j2 < i32::from(self.z) {
                        let ch = self.ch2 as u8;
                        self.block_crc.update_byte(ch);
                        self.j2 += 1;
                        return Ok(Some(ch));
                    } else {
                        self.i2 += 1;
                        self.count = 0;
                        self.state = if self.state == State::RandPartC {
                            State::RandPartA
                        } else {
                            State::NoRandPartA
                        };
                    }
                }
            }
        }
    }

    /// Next byte of the inverted BWT permutation walk.
    #[inline]
    fn bwt_next(&mut self) -> Result<u8> {
        let pos = self.t_pos as usize;
        if pos > self.last as usize {
            return Err(FerropackError::corrupt("BWT walk out of range"));
        }
        let b = self.ll8[pos];
        self.t_pos = self.tt[pos];
        Ok(b)
    }

    /// Advance the randomisation countdown; returns 1 at positions that
    /// were XORed by the encoder.
    #[inline]
    fn rand_bit(&mut self) -> u8 {
        if self.rn_to_go == 0 {
            self.rn_to_go = i32::from(RAND_NUMBERS[self.r_t_pos]);
            self.r_t_pos = (self.r_t_pos + 1) % 512;
        }
        self.rn_to_go -= 1;
        u8::from(self.rn_to_go == 1)
    }

    /// Verify the finished block's CRC and fold it into the combined CRC.
    fn end_block(&mut self) -> Result<()> {
        let computed = self.block_crc.value();
        if computed != self.stored_block_crc {
            return Err(FerropackError::checksum_mismatch(
                self.stored_block_crc,
                computed,
            ));
        }
        self.computed_combined_crc = self.computed_combined_crc.rotate_left(1) ^ computed;
        self.block_crc.reset();
        Ok(())
    }

    /// Read the next block header. Returns false on the end-of-stream
    /// marker (after validating the combined CRC).
    fn init_block(&mut self) -> Result<bool> {
        let mut magic = [0u8; 6];
        for byte in &mut magic {
            *byte = self.bits.read_bits(8)? as u8;
        }

        if magic == EOS_MAGIC {
            let stored = self.bits.read_u32()?;
            if stored != self.computed_combined_crc {
                return Err(FerropackError::checksum_mismatch(
                    stored,
                    self.computed_combined_crc,
                ));
            }
            return Ok(false);
        }
        if magic != BLOCK_MAGIC {
            return Err(FerropackError::corrupt("bad block magic"));
        }

        self.stored_block_crc = self.bits.read_u32()?;
        let randomised = self.bits.read_bit()?;
        let orig_ptr = self.bits.read_bits(24)? as i32;

        self.decode_block_payload()?;

        if orig_ptr > self.last {
            return Err(FerropackError::corrupt("origPtr beyond block end"));
        }
        log::debug!(
            "block: {} bytes, randomised={}, origPtr={}",
            self.last + 1,
            randomised,
            orig_ptr
        );

        // Invert the BWT: cftab counts each byte's region in the sorted
        // column, tt then threads every position to its successor.
        let n = (self.last + 1) as usize;
        let mut cftab = [0i32; 257];
        for c in 0..256 {
            cftab[c + 1] = cftab[c] + self.unzftab[c];
        }
        self.tt.clear();
        self.tt.resize(n, 0);
        for i in 0..n {
            let c = self.ll8[i] as usize;
            self.tt[cftab[c] as usize] = i as u32;
            cftab[c] += 1;
        }
        self.t_pos = self.tt[orig_ptr as usize];

        self.count = 0;
        self.i2 = 0;
        self.j2 = 0;
        self.ch2 = 256;
        self.ch_prev = 256;
        self.state = if randomised {
            self.rn_to_go = 0;
            self.r_t_pos = 0;
            State::RandPartA
        } else {
            State::NoRandPartA
        };
        Ok(true)
    }

    /// Read alphabet map, selectors and code tables, then decode the
    /// MTF/RLE2 symbol stream into `ll8`.
    fn decode_block_payload(&mut self) -> Result<()> {
        self.recv_decoding_tables()?;

        let eob = (self.n_in_use + 1) as u16;
        let mut yy: [u8; 256] = std::array::from_fn(|i| i as u8);
        self.unzftab = [0; 256];
        self.group_no = -1;
        self.group_pos = 0;
        self.last = -1;
        self.ll8.clear();
        self.ll8.reserve(self.limit_last);

        let mut next_sym = self.get_symbol()?;
        while next_sym != eob {
            if next_sym == RUN_A || next_sym == RUN_B {
                // Run of the symbol currently at the front of the MTF list,
                // length encoded as sum of (symbol+1) * 2^k.
                let mut s: i64 = -1;
                let mut n: i64 = 1;
                loop {
                    if next_sym == RUN_A {
                        s += n;
                    } else {
                        s += n << 1;
                    }
                    n <<= 1;
                    next_sym = self.get_symbol()?;
                    if next_sym != RUN_A && next_sym != RUN_B {
                        break;
                    }
                }
                s += 1;
                let ch = self.seq_to_unseq[yy[0] as usize];
                if self.last as i64 + s >= self.limit_last as i64 {
                    return Err(FerropackError::corrupt("block overrun in run decode"));
                }
                self.unzftab[ch as usize] += s as i32;
                for _ in 0..s {
                    self.last += 1;
                    self.ll8.push(ch);
                }
            } else {
                self.last += 1;
                if self.last as usize >= self.limit_last {
                    return Err(FerropackError::corrupt("block overrun in MTF decode"));
                }
                let j = (next_sym - 1) as usize;
                let tmp = yy[j];
                yy.copy_within(0..j, 1);
                yy[0] = tmp;
                let ch = self.seq_to_unseq[tmp as usize];
                self.unzftab[ch as usize] += 1;
                self.ll8.push(ch);
                next_sym = self.get_symbol()?;
            }
        }
        if self.last < 0 {
            return Err(FerropackError::corrupt("empty block"));
        }
        Ok(())
    }

    /// Read the alphabet bitmap, selector stream and the per-group
    /// delta-coded code lengths.
    fn recv_decoding_tables(&mut self) -> Result<()> {
        let coarse = self.bits.read_bits(16)?;
        self.in_use = [false; 256];
        for i in 0..16 {
            if coarse & (0x8000 >> i) != 0 {
                let fine = self.bits.read_bits(16)?;
                for j in 0..16 {
                    if fine & (0x8000 >> j) != 0 {
                        self.in_use[i * 16 + j] = true;
                    }
                }
            }
        }

        self.n_in_use = 0;
        for i in 0..256 {
            if self.in_use[i] {
                self.seq_to_unseq[self.n_in_use] = i as u8;
                self.n_in_use += 1;
            }
        }
        if self.n_in_use == 0 {
            return Err(FerropackError::corrupt("empty alphabet"));
        }
        let alpha_size = self.n_in_use + 2;

        let n_groups = self.bits.read_bits(3)? as usize;
        if !(2..=MAX_GROUPS).contains(&n_groups) {
            return Err(FerropackError::corrupt(format!(
                "bad group count {n_groups}"
            )));
        }
        let n_selectors = self.bits.read_bits(15)? as usize;
        if n_selectors == 0 || n_selectors > MAX_SELECTORS {
            return Err(FerropackError::corrupt(format!(
                "bad selector count {n_selectors}"
            )));
        }

        // Selectors are move-to-front coded over the group identifiers.
        let mut pos: [u8; MAX_GROUPS] = std::array::from_fn(|i| i as u8);
        self.selectors.clear();
        self.selectors.reserve(n_selectors);
        for _ in 0..n_selectors {
            let mut j = 0usize;
            while self.bits.read_bit()? {
                j += 1;
                if j >= n_groups {
                    return Err(FerropackError::corrupt("selector out of range"));
                }
            }
            let v = pos[j];
            pos.copy_within(0..j, 1);
            pos[0] = v;
            self.selectors.push(v);
        }

        self.groups.clear();
        for _ in 0..n_groups {
            let mut lengths = [0u8; MAX_ALPHA_SIZE];
            let mut curr = self.bits.read_bits(5)? as i32;
            for len_slot in lengths.iter_mut().take(alpha_size) {
                loop {
                    if !(1..=MAX_CODE_LEN as i32).contains(&curr) {
                        return Err(FerropackError::corrupt("code length out of range"));
                    }
                    if !self.bits.read_bit()? {
                        break;
                    }
                    if self.bits.read_bit()? {
                        curr -= 1;
                    } else {
                        curr += 1;
                    }
                }
                *len_slot = curr as u8;
            }
            self.groups.push(DecodeTables::new(&lengths, alpha_size)?);
        }
        Ok(())
    }

    /// Decode one symbol with the current 50-symbol group's table.
    fn get_symbol(&mut self) -> Result<u16> {
        if self.group_pos == 0 {
            self.group_no += 1;
            if self.group_no as usize >= self.selectors.len() {
                return Err(FerropackError::corrupt("selector stream exhausted"));
            }
            self.group_pos = GROUP_SIZE;
        }
        self.group_pos -= 1;

        let table = &self.groups[self.selectors[self.group_no as usize] as usize];
        let mut zn = table.min_len;
        let mut zvec = self.bits.read_bits(zn)? as i32;
        while zvec > table.limit[zn as usize] {
            zn += 1;
            if zn as usize > MAX_CODE_LEN {
                return Err(FerropackError::corrupt("Huffman code over 20 bits"));
            }
            zvec = (zvec << 1) | i32::from(self.bits.read_bit()?);
        }
        let idx = zvec - table.base[zn as usize];
        if !(0..MAX_ALPHA_SIZE as i32).contains(&idx) {
            return Err(FerropackError::corrupt("Huffman symbol out of range"));
        }
        Ok(table.perm[idx as usize])
    }
}

impl<R: Read> Read for BzDecoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut n = 0;
        while n < buf.len() {
            match self.read_byte() {
                Ok(Some(b)) => {
                    buf[n] = b;
                    n += 1;
                }
                Ok(None) => break,
                Err(FerropackError::Io(e)) => return Err(e),
                Err(e) => return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
            }
        }
        Ok(n)
    }
}

/// Decompress a whole BZip2 stream.
pub fn decompress<R: Read>(reader: R) -> Result<Vec<u8>> {
    let mut decoder = BzDecoder::new(reader)?;
    let mut output = Vec::new();
    while let Some(byte) = decoder.read_byte()? {
        output.push(byte);
    }
    Ok(output)
}
