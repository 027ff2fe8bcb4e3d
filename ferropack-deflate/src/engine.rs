//! Sliding-window LZ77 match finder for the deflater.
//!
//! A 64 KiB window holds two 32 KiB halves; when the write position crosses
//! into slide range the upper half drops down and every hash-chain index is
//! decremented by 32 KiB (clamping to the 0 sentinel). Candidate matches
//! are found through `head`/`prev` hash chains and compared with 8-byte
//! strides; per-level tunables bound how hard the search tries.

use crate::huffman::DeflaterHuffman;
use ferropack_core::checksum::Adler32;
use ferropack_core::error::{FerropackError, Result};

pub(crate) const WSIZE: usize = 1 << 15;
const WMASK: usize = WSIZE - 1;

const HASH_BITS: usize = 15;
const HASH_SIZE: usize = 1 << HASH_BITS;
const HASH_MASK: usize = HASH_SIZE - 1;
const HASH_SHIFT: usize = 5;

pub(crate) const MIN_MATCH: usize = 3;
pub(crate) const MAX_MATCH: usize = 258;

const MIN_LOOKAHEAD: usize = MAX_MATCH + MIN_MATCH + 1;
const MAX_DIST: usize = WSIZE - MIN_LOOKAHEAD;

/// Largest stored block the format can express.
const MAX_BLOCK_SIZE: usize = 65535;

/// Matches this short at distances past `TOO_FAR` cost more than literals.
const TOO_FAR: usize = 4096;

/// Per-level search tunables, straight from the published deflate tables.
const GOOD_LENGTH: [usize; 10] = [0, 4, 4, 4, 4, 8, 8, 8, 32, 32];
const MAX_LAZY: [usize; 10] = [0, 4, 5, 6, 4, 16, 16, 32, 128, 258];
const NICE_LENGTH: [usize; 10] = [0, 8, 16, 32, 16, 32, 128, 128, 258, 258];
const MAX_CHAIN: [usize; 10] = [0, 4, 8, 32, 16, 32, 128, 256, 1024, 4096];

/// Which compression loop each level runs.
const COMPR_FUNC: [CompressionFunction; 10] = [
    CompressionFunction::Store,
    CompressionFunction::Fast,
    CompressionFunction::Fast,
    CompressionFunction::Fast,
    CompressionFunction::Slow,
    CompressionFunction::Slow,
    CompressionFunction::Slow,
    CompressionFunction::Slow,
    CompressionFunction::Slow,
    CompressionFunction::Slow,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompressionFunction {
    Store,
    Fast,
    Slow,
}

/// Match-emission strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeflateStrategy {
    /// Normal LZ77 + Huffman.
    #[default]
    Default,
    /// Skip short far matches; suits data with small pre-filtered values.
    Filtered,
    /// Huffman-only: never emit matches.
    HuffmanOnly,
}

pub(crate) struct DeflaterEngine {
    pub huffman: DeflaterHuffman,
    window: Vec<u8>,
    head: Vec<u16>,
    prev: Vec<u16>,

    ins_h: usize,
    match_start: usize,
    match_len: usize,
    prev_available: bool,
    block_start: i64,
    strstart: usize,
    lookahead: usize,

    input: Vec<u8>,
    input_off: usize,
    input_end: usize,

    pub adler: Adler32,
    pub total_in: u64,

    strategy: DeflateStrategy,
    compr_func: CompressionFunction,
    good_length: usize,
    max_lazy: usize,
    nice_length: usize,
    max_chain: usize,
}

impl DeflaterEngine {
    pub fn new(level: u8) -> Self {
        let mut engine = Self {
            huffman: DeflaterHuffman::new(),
            window: vec![0u8; 2 * WSIZE],
            head: vec![0u16; HASH_SIZE],
            prev: vec![0u16; WSIZE],
            ins_h: 0,
            match_start: 0,
            match_len: MIN_MATCH - 1,
            prev_available: false,
            block_start: 0,
            strstart: 0,
            lookahead: 0,
            input: Vec::new(),
            input_off: 0,
            input_end: 0,
            adler: Adler32::new(),
            total_in: 0,
            strategy: DeflateStrategy::Default,
            compr_func: CompressionFunction::Store,
            good_length: 0,
            max_lazy: 0,
            nice_length: 0,
            max_chain: 0,
        };
        engine.set_level(level);
        engine
    }

    pub fn set_level(&mut self, level: u8) {
        let level = level.min(9) as usize;
        self.good_length = GOOD_LENGTH[level];
        self.max_lazy = MAX_LAZY[level];
        self.nice_length = NICE_LENGTH[level];
        self.max_chain = MAX_CHAIN[level];
        self.compr_func = COMPR_FUNC[level];
    }

    pub fn set_strategy(&mut self, strategy: DeflateStrategy) {
        self.strategy = strategy;
    }

    pub fn set_input(&mut self, data: &[u8]) -> Result<()> {
        if self.input_off < self.input_end {
            return Err(FerropackError::invalid_parameter(
                "previous input was not completely processed",
            ));
        }
        self.input.clear();
        self.input.extend_from_slice(data);
        self.input_off = 0;
        self.input_end = data.len();
        Ok(())
    }

    pub fn needs_input(&self) -> bool {
        self.input_end == self.input_off
    }

    /// Preload history so early matches can reference the dictionary.
    pub fn set_dictionary(&mut self, dictionary: &[u8]) {
        self.adler.update(dictionary);
        if dictionary.len() < MIN_MATCH {
            return;
        }
        let dict = if dictionary.len() > MAX_DIST {
            &dictionary[dictionary.len() - MAX_DIST..]
        } else {
            dictionary
        };
        self.window[self.strstart..self.strstart + dict.len()].copy_from_slice(dict);

        self.update_hash();
        for _ in 0..dict.len() - (MIN_MATCH - 1) {
            self.insert_string();
            self.strstart += 1;
        }
        self.strstart += MIN_MATCH - 1;
        self.block_start = self.strstart as i64;
    }

    pub fn reset(&mut self) {
        self.huffman.reset();
        self.huffman.pending.reset();
        self.head.iter_mut().for_each(|h| *h = 0);
        self.prev.iter_mut().for_each(|p| *p = 0);
        self.ins_h = 0;
        self.match_start = 0;
        self.match_len = MIN_MATCH - 1;
        self.prev_available = false;
        self.block_start = 0;
        self.strstart = 0;
        self.lookahead = 0;
        self.input.clear();
        self.input_off = 0;
        self.input_end = 0;
        self.adler.reset();
        self.total_in = 0;
    }

    #[inline]
    fn update_hash(&mut self) {
        self.ins_h =
            ((self.window[self.strstart] as usize) << HASH_SHIFT) ^ self.window[self.strstart + 1] as usize;
    }

    /// Hash the 3 bytes at `strstart` into the chains; returns the previous
    /// chain head (0 = none).
    #[inline]
    fn insert_string(&mut self) -> usize {
        let hash = ((self.ins_h << HASH_SHIFT)
            ^ self.window[self.strstart + (MIN_MATCH - 1)] as usize)
            & HASH_MASK;
        let match_head = self.head[hash] as usize;
        self.prev[self.strstart & WMASK] = self.head[hash];
        self.head[hash] = self.strstart as u16;
        self.ins_h = hash;
        match_head
    }

    fn slide_window(&mut self) {
        self.window.copy_within(WSIZE..2 * WSIZE, 0);
        self.match_start = self.match_start.saturating_sub(WSIZE);
        self.strstart -= WSIZE;
        self.block_start -= WSIZE as i64;

        for h in self.head.iter_mut() {
            *h = if *h as usize >= WSIZE {
                *h - WSIZE as u16
            } else {
                0
            };
        }
        for p in self.prev.iter_mut() {
            *p = if *p as usize >= WSIZE {
                *p - WSIZE as u16
            } else {
                0
            };
        }
    }

    fn fill_window(&mut self) {
        if self.strstart >= WSIZE + MAX_DIST {
            self.slide_window();
        }
        while self.lookahead < MIN_LOOKAHEAD && self.input_off < self.input_end {
            let more = (2 * WSIZE - self.lookahead - self.strstart)
                .min(self.input_end - self.input_off);
            self.window[self.strstart + self.lookahead..self.strstart + self.lookahead + more]
                .copy_from_slice(&self.input[self.input_off..self.input_off + more]);
            self.adler
                .update(&self.input[self.input_off..self.input_off + more]);
            self.input_off += more;
            self.total_in += more as u64;
            self.lookahead += more;
        }
        if self.lookahead >= MIN_MATCH {
            self.update_hash();
        }
    }

    /// Search the hash chain starting at `cur_match` for the longest match
    /// at `strstart`. Returns true (setting `match_start`/`match_len`) when
    /// a usable match of at least `MIN_MATCH` was found.
    fn find_longest_match(&mut self, mut cur_match: usize) -> bool {
        let mut chain_length = self.max_chain;
        let nice_length = self.nice_length.min(self.lookahead);
        let strstart = self.strstart;
        let mut best_len = self.match_len.max(MIN_MATCH - 1);
        let limit = strstart.saturating_sub(MAX_DIST);
        let strend = strstart + MAX_MATCH.min(self.lookahead);
        let window = &self.window;

        if best_len >= self.good_length {
            chain_length >>= 2;
        }

        loop {
            let mut scan_end = strstart + best_len;
            if scan_end >= strend {
                scan_end = strend - 1;
            }
            if window[cur_match + (scan_end - strstart)] == window[scan_end]
                && window[cur_match + (scan_end - strstart) - 1] == window[scan_end - 1]
                && window[cur_match] == window[strstart]
                && window[cur_match + 1] == window[strstart + 1]
            {
                // Bytes 0 and 1 matched; compare onward in 8-byte strides,
                // then settle the exact mismatch bytewise.
                let mut scan = strstart + 2;
                let mut mat = cur_match + 2;
                while scan + 8 <= strend && window[scan..scan + 8] == window[mat..mat + 8] {
                    scan += 8;
                    mat += 8;
                }
                while scan < strend && window[scan] == window[mat] {
                    scan += 1;
                    mat += 1;
                }
                let len = scan - strstart;
                if len > best_len {
                    self.match_start = cur_match;
                    best_len = len;
                    if len >= nice_length {
                        break;
                    }
                }
            }

            cur_match = self.prev[cur_match & WMASK] as usize;
            if cur_match <= limit {
                break;
            }
            chain_length -= 1;
            if chain_length == 0 {
                break;
            }
        }

        self.match_len = best_len.min(self.lookahead);
        self.match_len >= MIN_MATCH
    }

    /// Run the engine. Returns false when it can make no further progress
    /// without more input (or, when finishing, once the final block went
    /// out).
    pub fn deflate(&mut self, flush: bool, finish: bool) -> bool {
        let mut progress;
        loop {
            self.fill_window();
            let can_flush = flush && self.input_off == self.input_end;
            progress = match self.compr_func {
                CompressionFunction::Store => self.deflate_stored(can_flush, finish),
                CompressionFunction::Fast => self.deflate_fast(can_flush, finish),
                CompressionFunction::Slow => self.deflate_slow(can_flush, finish),
            };
            if !(self.huffman.pending.is_flushed() && progress) {
                break;
            }
        }
        progress
    }

    fn deflate_stored(&mut self, flush: bool, finish: bool) -> bool {
        if !flush && self.lookahead == 0 {
            return false;
        }
        self.strstart += self.lookahead;
        self.lookahead = 0;

        let mut stored_len = self.strstart - self.block_start as usize;
        if stored_len >= MAX_BLOCK_SIZE
            || (self.block_start < WSIZE as i64 && stored_len >= MAX_DIST)
            || flush
        {
            let mut last_block = finish;
            if stored_len > MAX_BLOCK_SIZE {
                stored_len = MAX_BLOCK_SIZE;
                last_block = false;
            }
            let start = self.block_start as usize;
            // Borrow dance: huffman writes from the window slice.
            let (huffman, window) = (&mut self.huffman, &self.window);
            huffman.flush_stored_block(&window[start..start + stored_len], last_block);
            self.block_start += stored_len as i64;
            return !last_block;
        }
        true
    }

    fn deflate_fast(&mut self, flush: bool, finish: bool) -> bool {
        if self.lookahead < MIN_LOOKAHEAD && !flush {
            return false;
        }

        while self.lookahead >= MIN_LOOKAHEAD || flush {
            if self.lookahead == 0 {
                // Input exhausted: emit what was gathered. A stored
                // fallback needs the block's raw bytes, which are gone if
                // the window slid mid-block.
                let stored = if self.block_start >= 0 {
                    Some(&self.window[self.block_start as usize..self.strstart])
                } else {
                    None
                };
                self.huffman.flush_block(stored, finish);
                self.block_start = self.strstart as i64;
                return false;
            }
            if self.strstart > 2 * WSIZE - MIN_LOOKAHEAD {
                self.slide_window();
            }

            let mut found_match = false;
            if self.lookahead >= MIN_MATCH && self.strategy != DeflateStrategy::HuffmanOnly {
                let hash_head = self.insert_string();
                if hash_head != 0
                    && self.strstart - hash_head <= MAX_DIST
                    && self.find_longest_match(hash_head)
                {
                    found_match = true;
                }
            }

            let full;
            if found_match {
                full = self
                    .huffman
                    .tally_dist(self.strstart - self.match_start, self.match_len);

                self.lookahead -= self.match_len;
                if self.match_len <= self.max_lazy && self.lookahead >= MIN_MATCH {
                    // Insert every position of the match into the chains.
                    let mut remaining = self.match_len - 1;
                    while remaining > 0 {
                        self.strstart += 1;
                        self.insert_string();
                        remaining -= 1;
                    }
                    self.strstart += 1;
                } else {
                    self.strstart += self.match_len;
                    if self.lookahead >= MIN_MATCH - 1 {
                        self.update_hash();
                    }
                }
                self.match_len = MIN_MATCH - 1;
            } else {
                full = self.huffman.tally_lit(self.window[self.strstart]);
                self.strstart += 1;
                self.lookahead -= 1;
            }

            if full {
                let stored = if self.block_start >= 0 {
                    Some(&self.window[self.block_start as usize..self.strstart])
                } else {
                    None
                };
                self.huffman.flush_block(stored, false);
                self.block_start = self.strstart as i64;
            }
        }
        true
    }

    fn deflate_slow(&mut self, flush: bool, finish: bool) -> bool {
        if self.lookahead < MIN_LOOKAHEAD && !flush {
            return false;
        }

        while self.lookahead >= MIN_LOOKAHEAD || flush {
            if self.lookahead == 0 {
                if self.prev_available {
                    self.huffman.tally_lit(self.window[self.strstart - 1]);
                }
                self.prev_available = false;
                let stored = if self.block_start >= 0 {
                    Some(&self.window[self.block_start as usize..self.strstart])
                } else {
                    None
                };
                self.huffman.flush_block(stored, finish);
                self.block_start = self.strstart as i64;
                return false;
            }
            if self.strstart >= 2 * WSIZE - MIN_LOOKAHEAD {
                self.slide_window();
            }

            let prev_match = self.match_start;
            let mut prev_len = self.match_len;

            if self.lookahead >= MIN_MATCH && self.strategy != DeflateStrategy::HuffmanOnly {
                let hash_head = self.insert_string();
                if hash_head != 0
                    && self.strstart - hash_head <= MAX_DIST
                    && self.find_longest_match(hash_head)
                {
                    // Discard short far matches that cost more than the
                    // literals they replace.
                    if self.match_len <= 5
                        && (self.strategy == DeflateStrategy::Filtered
                            || (self.match_len == MIN_MATCH
                                && self.strstart - self.match_start > TOO_FAR))
                    {
                        self.match_len = MIN_MATCH - 1;
                    }
                }
            }

            let full;
            if prev_len >= MIN_MATCH && self.match_len <= prev_len {
                // The previous position's match wins; emit it and skip the
                // matched bytes.
                full = self
                    .huffman
                    .tally_dist(self.strstart - 1 - prev_match, prev_len);
                prev_len -= 2;
                loop {
                    self.strstart += 1;
                    self.lookahead -= 1;
                    if self.lookahead >= MIN_MATCH {
                        self.insert_string();
                    }
                    prev_len -= 1;
                    if prev_len == 0 {
                        break;
                    }
                }
                self.strstart += 1;
                self.lookahead -= 1;
                self.prev_available = false;
                self.match_len = MIN_MATCH - 1;
            } else {
                full = if self.prev_available {
                    self.huffman.tally_lit(self.window[self.strstart - 1])
                } else {
                    false
                };
                self.prev_available = true;
                self.strstart += 1;
                self.lookahead -= 1;
            }

            if full {
                let len = self.strstart as i64 - self.block_start - i64::from(self.prev_available);
                let last_block = finish && self.lookahead == 0 && !self.prev_available;
                let stored = if self.block_start >= 0 {
                    let start = self.block_start as usize;
                    Some(&self.window[start..start + len as usize])
                } else {
                    None
                };
                self.huffman.flush_block(stored, last_block);
                self.block_start += len;
                return !last_block;
            }
        }
        true
    }
}
