//! DEFLATE decompression (RFC 1951), with optional zlib framing (RFC 1950).
//!
//! `Inflater` is a cooperative state machine. Input arrives through
//! `set_input`, output is pulled with `inflate`, and whenever a field
//! cannot be completed with the bits on hand the machine parks in its
//! current state and reports `needs_input` instead of consuming anything.
//! Feeding a valid stream one byte at a time therefore never produces an
//! error, only short reads.

use crate::input::StreamManipulator;
use crate::tree::{HuffmanTree, fixed_distance_tree, fixed_litlen_tree};
use crate::window::OutputWindow;
use ferropack_core::checksum::Adler32;
use ferropack_core::error::{FerropackError, Result};

/// Match length bases for symbols 257..=285.
pub(crate) const CPLENS: [u16; 29] = [
    3, 4, 5, 6, 7, 8, 9, 10, 11, 13, 15, 17, 19, 23, 27, 31, 35, 43, 51, 59, 67, 83, 99, 115,
    131, 163, 195, 227, 258,
];

/// Extra bits for the length symbols.
pub(crate) const CPLEXT: [u8; 29] = [
    0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4, 5, 5, 5, 5, 0,
];

/// Distance bases for symbols 0..=29.
pub(crate) const CPDIST: [u16; 30] = [
    1, 2, 3, 4, 5, 7, 9, 13, 17, 25, 33, 49, 65, 97, 129, 193, 257, 385, 513, 769, 1025, 1537,
    2049, 3073, 4097, 6145, 8193, 12289, 16385, 24577,
];

/// Extra bits for the distance symbols.
pub(crate) const CPDEXT: [u8; 30] = [
    0, 0, 0, 0, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 6, 7, 7, 8, 8, 9, 9, 10, 10, 11, 11, 12, 12,
    13, 13,
];

/// Order in which code-length-code lengths appear in a dynamic header.
pub(crate) const BL_ORDER: [usize; 19] = [
    16, 17, 18, 0, 8, 7, 9, 6, 10, 5, 11, 4, 12, 3, 13, 2, 14, 1, 15,
];

/// Inflater state. The `Huffman*` states are the compressed-data inner
/// machine; a symbol interrupted by input exhaustion resumes in the exact
/// sub-state it parked in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Header,
    Dictionary,
    Blocks,
    StoredLen1,
    StoredLen2,
    Stored,
    DynamicHeader,
    Huffman,
    HuffmanLenBits,
    HuffmanDist,
    HuffmanDistBits,
    Checksum,
    Done,
}

/// Streaming DEFLATE decompressor.
pub struct Inflater {
    mode: State,
    /// Raw DEFLATE when true; zlib header/trailer when false.
    raw: bool,
    input: StreamManipulator,
    output: OutputWindow,
    dyn_header: DynHeader,
    litlen_tree: Option<HuffmanTree>,
    dist_tree: Option<HuffmanTree>,
    /// Fixed-tree block in progress (trees borrowed from statics).
    using_fixed_trees: bool,
    adler: Adler32,
    read_adler: u32,
    needed_bits: u32,
    rep_length: usize,
    rep_dist: usize,
    uncompr_len: usize,
    is_last_block: bool,
    total_in: u64,
    total_out: u64,
}

impl Inflater {
    /// Create an inflater. `raw` skips the zlib header and Adler trailer.
    pub fn new(raw: bool) -> Self {
        Self {
            mode: if raw { State::Blocks } else { State::Header },
            raw,
            input: StreamManipulator::new(),
            output: OutputWindow::new(),
            dyn_header: DynHeader::new(),
            litlen_tree: None,
            dist_tree: None,
            using_fixed_trees: false,
            adler: Adler32::new(),
            read_adler: 0,
            needed_bits: 0,
            rep_length: 0,
            rep_dist: 0,
            uncompr_len: 0,
            is_last_block: false,
            total_in: 0,
            total_out: 0,
        }
    }

    /// Supply more compressed input.
    pub fn set_input(&mut self, data: &[u8]) -> Result<()> {
        self.input.set_input(data)?;
        self.total_in += data.len() as u64;
        Ok(())
    }

    /// True when every supplied input byte has been consumed.
    pub fn needs_input(&self) -> bool {
        self.input.needs_input()
    }

    /// True when the stream requires a preset dictionary before it can
    /// continue.
    pub fn needs_dictionary(&self) -> bool {
        self.mode == State::Dictionary && self.needed_bits == 0
    }

    /// True when the stream has fully ended and all output was drained.
    pub fn is_finished(&self) -> bool {
        self.mode == State::Done && self.output.get_available() == 0
    }

    /// The running Adler-32 of produced output, or the required dictionary
    /// id while one is awaited.
    pub fn adler(&self) -> u32 {
        if self.needs_dictionary() {
            self.read_adler
        } else {
            self.adler.value()
        }
    }

    /// Total compressed bytes supplied.
    pub fn total_in(&self) -> u64 {
        self.total_in
    }

    /// Total decompressed bytes produced.
    pub fn total_out(&self) -> u64 {
        self.total_out
    }

    /// Provide the preset dictionary the stream asked for.
    pub fn set_dictionary(&mut self, dictionary: &[u8]) -> Result<()> {
        if !self.needs_dictionary() {
            return Err(FerropackError::invalid_parameter(
                "no dictionary is expected here",
            ));
        }
        let computed = Adler32::checksum(dictionary);
        if computed != self.read_adler {
            return Err(FerropackError::checksum_mismatch(self.read_adler, computed));
        }
        self.output.copy_dict(dictionary);
        self.adler.reset();
        self.mode = State::Blocks;
        Ok(())
    }

    /// Reset to the initial state, keeping the raw/zlib flavour.
    pub fn reset(&mut self) {
        self.mode = if self.raw { State::Blocks } else { State::Header };
        self.input.reset();
        self.output.reset();
        self.litlen_tree = None;
        self.dist_tree = None;
        self.using_fixed_trees = false;
        self.adler.reset();
        self.read_adler = 0;
        self.needed_bits = 0;
        self.rep_length = 0;
        self.rep_dist = 0;
        self.uncompr_len = 0;
        self.is_last_block = false;
        self.total_in = 0;
        self.total_out = 0;
    }

    /// Decompress into `out`, returning the number of bytes produced.
    ///
    /// Returning 0 means the engine is suspended: check `needs_input`,
    /// `needs_dictionary` or `is_finished` to see why.
    pub fn inflate(&mut self, out: &mut [u8]) -> Result<usize> {
        if out.is_empty() {
            // Still drive the engine one step so header/checksum states
            // progress even when the caller polls with no buffer.
            if !self.is_finished() {
                self.decode()?;
            }
            return Ok(0);
        }

        let mut copied = 0;
        loop {
            if self.mode != State::Checksum {
                let n = self.output.copy_output(&mut out[copied..]);
                if n > 0 {
                    self.adler.update(&out[copied..copied + n]);
                    self.total_out += n as u64;
                    copied += n;
                    if copied == out.len() {
                        return Ok(copied);
                    }
                }
            }
            let progressed = self.decode()?;
            if !(progressed || (self.output.get_available() > 0 && self.mode != State::Checksum))
            {
                return Ok(copied);
            }
        }
    }

    /// Advance the state machine one step. Returns false when blocked on
    /// input, output space, a dictionary, or completion.
    fn decode(&mut self) -> Result<bool> {
        match self.mode {
            State::Header => self.decode_header(),
            State::Dictionary => self.decode_dict(),
            State::Blocks => self.decode_blocks(),
            State::StoredLen1 => {
                let Some(len) = self.input.get_bits(16) else {
                    return Ok(false);
                };
                self.uncompr_len = len as usize;
                self.mode = State::StoredLen2;
                Ok(true)
            }
            State::StoredLen2 => {
                let Some(nlen) = self.input.get_bits(16) else {
                    return Ok(false);
                };
                if nlen as usize != (self.uncompr_len ^ 0xFFFF) {
                    return Err(FerropackError::corrupt("stored block NLEN mismatch"));
                }
                self.mode = State::Stored;
                Ok(true)
            }
            State::Stored => {
                let copied = self
                    .output
                    .copy_stored(&mut self.input, self.uncompr_len)?;
                self.uncompr_len -= copied;
                if self.uncompr_len == 0 {
                    self.mode = State::Blocks;
                    return Ok(true);
                }
                Ok(copied > 0)
            }
            State::DynamicHeader => {
                if !self.dyn_header.decode(&mut self.input)? {
                    return Ok(false);
                }
                let (litlen, dist) = self.dyn_header.build_trees()?;
                self.litlen_tree = Some(litlen);
                self.dist_tree = Some(dist);
                self.using_fixed_trees = false;
                self.mode = State::Huffman;
                self.decode_huffman()
            }
            State::Huffman
            | State::HuffmanLenBits
            | State::HuffmanDist
            | State::HuffmanDistBits => self.decode_huffman(),
            State::Checksum => self.decode_checksum(),
            State::Done => Ok(false),
        }
    }

    fn decode_header(&mut self) -> Result<bool> {
        let Some(header) = self.input.peek_bits(16) else {
            return Ok(false);
        };
        self.input.drop_bits(16);
        // First byte on the wire is CMF, second FLG.
        let cmf = header & 0xFF;
        let flg = header >> 8;
        if (cmf * 256 + flg) % 31 != 0 {
            return Err(FerropackError::corrupt("zlib header checksum failed"));
        }
        if cmf & 0x0F != 8 {
            return Err(FerropackError::corrupt(format!(
                "unknown compression method {}",
                cmf & 0x0F
            )));
        }
        if cmf >> 4 > 7 {
            return Err(FerropackError::corrupt("window size exceeds 32 KiB"));
        }
        if flg & 0x20 != 0 {
            self.mode = State::Dictionary;
            self.needed_bits = 32;
            self.read_adler = 0;
        } else {
            self.mode = State::Blocks;
        }
        Ok(true)
    }

    fn decode_dict(&mut self) -> Result<bool> {
        while self.needed_bits > 0 {
            let Some(byte) = self.input.get_bits(8) else {
                return Ok(false);
            };
            self.read_adler = (self.read_adler << 8) | byte;
            self.needed_bits -= 8;
        }
        // Parked until set_dictionary is called.
        Ok(false)
    }

    fn decode_blocks(&mut self) -> Result<bool> {
        if self.is_last_block {
            if self.raw {
                self.mode = State::Done;
                return Ok(false);
            }
            self.input.skip_to_byte_boundary();
            self.needed_bits = 32;
            self.read_adler = 0;
            self.mode = State::Checksum;
            return Ok(true);
        }

        let Some(header) = self.input.peek_bits(3) else {
            return Ok(false);
        };
        self.input.drop_bits(3);
        self.is_last_block |= header & 1 == 1;
        match header >> 1 {
            0 => {
                self.input.skip_to_byte_boundary();
                self.mode = State::StoredLen1;
            }
            1 => {
                self.litlen_tree = None;
                self.dist_tree = None;
                self.using_fixed_trees = true;
                self.mode = State::Huffman;
            }
            2 => {
                self.dyn_header = DynHeader::new();
                self.mode = State::DynamicHeader;
            }
            _ => {
                return Err(FerropackError::corrupt("reserved block type 3"));
            }
        }
        Ok(true)
    }

    fn decode_checksum(&mut self) -> Result<bool> {
        while self.needed_bits > 0 {
            let Some(byte) = self.input.get_bits(8) else {
                return Ok(false);
            };
            self.read_adler = (self.read_adler << 8) | byte;
            self.needed_bits -= 8;
        }
        let computed = self.adler.value();
        if computed != self.read_adler {
            return Err(FerropackError::checksum_mismatch(self.read_adler, computed));
        }
        self.mode = State::Done;
        Ok(false)
    }

    /// The compressed-data inner machine: literals, then length/extra/
    /// distance/extra for matches, suspending between any two reads.
    fn decode_huffman(&mut self) -> Result<bool> {
        let litlen: &HuffmanTree = if self.using_fixed_trees {
            fixed_litlen_tree()
        } else {
            self.litlen_tree
                .as_ref()
                .ok_or_else(|| FerropackError::internal("literal tree missing"))?
        };
        let dist: &HuffmanTree = if self.using_fixed_trees {
            fixed_distance_tree()
        } else {
            self.dist_tree
                .as_ref()
                .ok_or_else(|| FerropackError::internal("distance tree missing"))?
        };

        let mut free = self.output.get_free_space();
        while free >= 258 {
            match self.mode {
                State::Huffman => {
                    let Some(symbol) = litlen.get_symbol(&mut self.input)? else {
                        return Ok(false);
                    };
                    if symbol < 256 {
                        self.output.write(symbol as u8);
                        free -= 1;
                        continue;
                    }
                    if symbol == 256 {
                        self.mode = State::Blocks;
                        return Ok(true);
                    }
                    let idx = symbol as usize - 257;
                    if idx >= CPLENS.len() {
                        return Err(FerropackError::corrupt(format!(
                            "invalid length symbol {symbol}"
                        )));
                    }
                    self.rep_length = CPLENS[idx] as usize;
                    self.needed_bits = u32::from(CPLEXT[idx]);
                    self.mode = State::HuffmanLenBits;
                }
                State::HuffmanLenBits => {
                    if self.needed_bits > 0 {
                        let Some(extra) = self.input.get_bits(self.needed_bits) else {
                            return Ok(false);
                        };
                        self.rep_length += extra as usize;
                    }
                    self.mode = State::HuffmanDist;
                }
                State::HuffmanDist => {
                    let Some(symbol) = dist.get_symbol(&mut self.input)? else {
                        return Ok(false);
                    };
                    let idx = symbol as usize;
                    if idx >= CPDIST.len() {
                        return Err(FerropackError::corrupt(format!(
                            "invalid distance symbol {symbol}"
                        )));
                    }
                    self.rep_dist = CPDIST[idx] as usize;
                    self.needed_bits = u32::from(CPDEXT[idx]);
                    self.mode = State::HuffmanDistBits;
                }
                State::HuffmanDistBits => {
                    if self.needed_bits > 0 {
                        let Some(extra) = self.input.get_bits(self.needed_bits) else {
                            return Ok(false);
                        };
                        self.rep_dist += extra as usize;
                    }
                    self.output.repeat(self.rep_length, self.rep_dist)?;
                    free -= self.rep_length;
                    self.mode = State::Huffman;
                }
                _ => return Err(FerropackError::internal("bad state in huffman decode")),
            }
        }
        Ok(true)
    }
}

/// Sub-machine for the dynamic block header: counts, code-length-code
/// lengths, then the run-length-coded literal/distance length arrays.
struct DynHeader {
    state: DynHeaderState,
    lnum: usize,
    dnum: usize,
    blnum: usize,
    bl_lens: [u8; 19],
    bl_tree: Option<HuffmanTree>,
    lengths: Vec<u8>,
    ptr: usize,
    last_len: u8,
    rep_bits: u32,
    rep_min: usize,
    rep_fill: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DynHeaderState {
    Counts,
    ClLengths,
    Symbols,
    Repeat,
    Done,
}

impl DynHeader {
    fn new() -> Self {
        Self {
            state: DynHeaderState::Counts,
            lnum: 0,
            dnum: 0,
            blnum: 0,
            bl_lens: [0; 19],
            bl_tree: None,
            lengths: Vec::new(),
            ptr: 0,
            last_len: 0,
            rep_bits: 0,
            rep_min: 0,
            rep_fill: 0,
        }
    }

    /// Returns true once the whole header has been read.
    fn decode(&mut self, input: &mut StreamManipulator) -> Result<bool> {
        loop {
            match self.state {
                DynHeaderState::Counts => {
                    let Some(counts) = input.get_bits(14) else {
                        return Ok(false);
                    };
                    self.lnum = (counts & 0x1F) as usize + 257;
                    self.dnum = ((counts >> 5) & 0x1F) as usize + 1;
                    self.blnum = ((counts >> 10) & 0xF) as usize + 4;
                    if self.lnum > 286 || self.dnum > 30 {
                        return Err(FerropackError::corrupt(
                            "too many literal or distance codes",
                        ));
                    }
                    self.lengths = vec![0u8; self.lnum + self.dnum];
                    self.ptr = 0;
                    self.state = DynHeaderState::ClLengths;
                }
                DynHeaderState::ClLengths => {
                    while self.ptr < self.blnum {
                        let Some(len) = input.get_bits(3) else {
                            return Ok(false);
                        };
                        self.bl_lens[BL_ORDER[self.ptr]] = len as u8;
                        self.ptr += 1;
                    }
                    self.bl_tree = Some(HuffmanTree::new(&self.bl_lens)?);
                    self.ptr = 0;
                    self.state = DynHeaderState::Symbols;
                }
                DynHeaderState::Symbols => {
                    let tree = self
                        .bl_tree
                        .as_ref()
                        .ok_or_else(|| FerropackError::internal("bl tree missing"))?;
                    while self.ptr < self.lengths.len() {
                        let Some(symbol) = tree.get_symbol(input)? else {
                            return Ok(false);
                        };
                        match symbol {
                            0..=15 => {
                                self.lengths[self.ptr] = symbol as u8;
                                self.last_len = symbol as u8;
                                self.ptr += 1;
                            }
                            16 => {
                                if self.ptr == 0 {
                                    return Err(FerropackError::corrupt(
                                        "length repeat with no previous length",
                                    ));
                                }
                                self.rep_bits = 2;
                                self.rep_min = 3;
                                self.rep_fill = self.last_len;
                                self.state = DynHeaderState::Repeat;
                                break;
                            }
                            17 => {
                                self.rep_bits = 3;
                                self.rep_min = 3;
                                self.rep_fill = 0;
                                self.state = DynHeaderState::Repeat;
                                break;
                            }
                            18 => {
                                self.rep_bits = 7;
                                self.rep_min = 11;
                                self.rep_fill = 0;
                                self.state = DynHeaderState::Repeat;
                                break;
                            }
                            _ => {
                                return Err(FerropackError::corrupt(format!(
                                    "invalid code-length symbol {symbol}"
                                )));
                            }
                        }
                    }
                    if self.ptr == self.lengths.len() {
                        self.state = DynHeaderState::Done;
                        return Ok(true);
                    }
                }
                DynHeaderState::Repeat => {
                    let Some(extra) = input.get_bits(self.rep_bits) else {
                        return Ok(false);
                    };
                    let count = self.rep_min + extra as usize;
                    if self.ptr + count > self.lengths.len() {
                        return Err(FerropackError::corrupt("length repeat overruns table"));
                    }
                    for _ in 0..count {
                        self.lengths[self.ptr] = self.rep_fill;
                        self.ptr += 1;
                    }
                    self.last_len = self.rep_fill;
                    if self.ptr == self.lengths.len() {
                        self.state = DynHeaderState::Done;
                        return Ok(true);
                    }
                    self.state = DynHeaderState::Symbols;
                }
                DynHeaderState::Done => return Ok(true),
            }
        }
    }

    /// Build the literal/length and distance trees from the decoded
    /// lengths.
    fn build_trees(&self) -> Result<(HuffmanTree, HuffmanTree)> {
        let litlen = HuffmanTree::new(&self.lengths[..self.lnum])?;
        let dist = HuffmanTree::new(&self.lengths[self.lnum..])?;
        Ok((litlen, dist))
    }
}

/// Decompress a complete raw DEFLATE buffer in one call.
pub fn inflate(data: &[u8]) -> Result<Vec<u8>> {
    inflate_with(data, true)
}

/// Decompress a complete zlib-wrapped buffer in one call.
pub fn zlib_decompress(data: &[u8]) -> Result<Vec<u8>> {
    inflate_with(data, false)
}

fn inflate_with(data: &[u8], raw: bool) -> Result<Vec<u8>> {
    let mut inflater = Inflater::new(raw);
    inflater.set_input(data)?;
    let mut output = Vec::new();
    let mut buf = [0u8; 16 * 1024];
    loop {
        let n = inflater.inflate(&mut buf)?;
        output.extend_from_slice(&buf[..n]);
        if n == 0 {
            if inflater.is_finished() {
                return Ok(output);
            }
            if inflater.needs_dictionary() {
                return Err(FerropackError::invalid_parameter(
                    "stream requires a preset dictionary",
                ));
            }
            if inflater.needs_input() {
                return Err(FerropackError::unexpected_eof(1));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The canonical zlib compression of the empty input: fixed-tree block
    /// holding only end-of-block, then Adler-32 of nothing.
    const EMPTY_ZLIB: [u8; 8] = [0x78, 0x9C, 0x03, 0x00, 0x00, 0x00, 0x00, 0x01];

    #[test]
    fn test_reference_empty_zlib_stream() {
        assert_eq!(zlib_decompress(&EMPTY_ZLIB).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_stored_block_raw() {
        // BFINAL=1 BTYPE=00, aligned, LEN=5 NLEN=~5, "hello".
        let data = [0x01, 0x05, 0x00, 0xFA, 0xFF, b'h', b'e', b'l', b'l', b'o'];
        assert_eq!(inflate(&data).unwrap(), b"hello");
    }

    #[test]
    fn test_stored_block_nlen_mismatch() {
        let data = [0x01, 0x05, 0x00, 0xFB, 0xFF, b'h', b'e', b'l', b'l', b'o'];
        assert!(matches!(
            inflate(&data),
            Err(FerropackError::CorruptData { .. })
        ));
    }

    #[test]
    fn test_reserved_block_type() {
        // BFINAL=1, BTYPE=11.
        let data = [0x07];
        assert!(matches!(
            inflate(&data),
            Err(FerropackError::CorruptData { .. })
        ));
    }

    #[test]
    fn test_bad_zlib_header() {
        let data = [0x78, 0x9D, 0x03, 0x00];
        assert!(matches!(
            zlib_decompress(&data),
            Err(FerropackError::CorruptData { .. })
        ));
    }

    #[test]
    fn test_adler_trailer_mismatch() {
        let mut data = EMPTY_ZLIB;
        data[7] = 0x02;
        assert!(matches!(
            zlib_decompress(&data),
            Err(FerropackError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_byte_at_a_time_never_errors() {
        let mut inflater = Inflater::new(false);
        let mut out = Vec::new();
        let mut buf = [0u8; 64];
        for &byte in &EMPTY_ZLIB {
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
        assert!(out.is_empty());
        assert_eq!(inflater.adler(), 1);
    }

    #[test]
    fn test_fixed_block_single_literal() {
        // 'A' (0x41) as a fixed-tree literal, then EOB: code for 0x41 is
        // 0x30 + 0x41 = 0x71 (8 bits), EOB is 7 zero bits.
        // Bits LSB-first: 1 (final), 01 (static), then reversed codes.
        let mut bits: Vec<bool> = Vec::new();
        bits.push(true);
        bits.push(true);
        bits.push(false);
        let code = 0x30u16 + 0x41;
        for i in (0..8).rev() {
            bits.push((code >> i) & 1 == 1);
        }
        bits.extend(std::iter::repeat_n(false, 7));
        let mut bytes = vec![0u8; bits.len().div_ceil(8)];
        for (i, &bit) in bits.iter().enumerate() {
            if bit {
                bytes[i / 8] |= 1 << (i % 8);
            }
        }
        assert_eq!(inflate(&bytes).unwrap(), b"A");
    }
}
