//! Huffman decoding tables for the inflater.
//!
//! Code lengths become canonical codes, the codes are bit-reversed into the
//! LSB-first order they arrive in on the wire, and every code is replicated
//! across a flat lookup table indexed by `max_len` peeked bits. One peek
//! then resolves any symbol; `get_symbol` never consumes bits it cannot
//! decode, so the inflater can suspend cleanly mid-symbol.

use crate::input::StreamManipulator;
use ferropack_core::error::{FerropackError, Result};

/// Longest code length RFC 1951 permits.
pub const MAX_BITLEN: usize = 15;

/// Table entry marking an index no code maps to.
const INVALID: u16 = u16::MAX;

/// A decoding table built from per-symbol code lengths.
pub struct HuffmanTree {
    /// `(symbol << 4) | code_len` per peek index; `INVALID` for holes.
    table: Vec<u16>,
    /// Bits of peek needed for one unambiguous lookup.
    max_len: u32,
}

impl HuffmanTree {
    /// Build a tree from code lengths (0 = symbol absent).
    ///
    /// Over-subscribed length sets are rejected; incomplete sets are
    /// accepted (a one-code distance tree is legal) and decode into holes.
    pub fn new(code_lengths: &[u8]) -> Result<Self> {
        let mut bl_count = [0u32; MAX_BITLEN + 1];
        let mut max_len = 0usize;
        for &len in code_lengths {
            let len = len as usize;
            if len > MAX_BITLEN {
                return Err(FerropackError::corrupt(format!(
                    "code length {len} exceeds 15"
                )));
            }
            if len > 0 {
                bl_count[len] += 1;
                max_len = max_len.max(len);
            }
        }

        if max_len == 0 {
            return Ok(Self {
                table: Vec::new(),
                max_len: 0,
            });
        }

        // Kraft check: over-subscription means the lengths cannot form a
        // prefix code.
        let mut used = 0u64;
        for (len, &count) in bl_count.iter().enumerate().skip(1) {
            used += u64::from(count) << (max_len - len);
        }
        if used > 1u64 << max_len {
            return Err(FerropackError::corrupt("over-subscribed code lengths"));
        }

        // Canonical first-code per length.
        let mut next_code = [0u32; MAX_BITLEN + 2];
        let mut code = 0u32;
        for len in 1..=max_len {
            next_code[len] = code;
            code = (code + bl_count[len]) << 1;
        }

        let mut table = vec![INVALID; 1 << max_len];
        for (symbol, &len) in code_lengths.iter().enumerate() {
            let len = len as usize;
            if len == 0 {
                continue;
            }
            let canonical = next_code[len];
            next_code[len] += 1;

            // Reverse into wire order, then replicate across the free high
            // bits of the peek index.
            let reversed = (canonical.reverse_bits() >> (32 - len)) as usize;
            let entry = ((symbol as u16) << 4) | len as u16;
            let mut idx = reversed;
            while idx < table.len() {
                table[idx] = entry;
                idx += 1 << len;
            }
        }

        Ok(Self {
            table,
            max_len: max_len as u32,
        })
    }

    /// Decode one symbol.
    ///
    /// Returns `Ok(None)` when the input cannot yet supply enough bits to
    /// decide (suspend), `CorruptData` when the peeked bits match no code.
    pub fn get_symbol(&self, input: &mut StreamManipulator) -> Result<Option<u16>> {
        if self.table.is_empty() {
            return Err(FerropackError::corrupt("symbol read from empty code set"));
        }
        match input.peek_bits(self.max_len) {
            Some(look) => {
                let entry = self.table[look as usize];
                if entry == INVALID {
                    return Err(FerropackError::corrupt("invalid Huffman code"));
                }
                input.drop_bits(u32::from(entry & 15));
                Ok(Some(entry >> 4))
            }
            None => {
                // Near end of input: the bits on hand may still resolve a
                // short code (missing high index bits cannot change entries
                // whose length fits the available bits).
                let avail = input.available_bits();
                if avail == 0 {
                    return Ok(None);
                }
                let look = input
                    .peek_bits(avail)
                    .expect("available bits must be peekable");
                let entry = self.table[look as usize];
                if entry != INVALID && u32::from(entry & 15) <= avail {
                    input.drop_bits(u32::from(entry & 15));
                    Ok(Some(entry >> 4))
                } else {
                    Ok(None)
                }
            }
        }
    }
}

/// Fixed literal/length code lengths (RFC 1951 section 3.2.6).
fn fixed_litlen_lengths() -> [u8; 288] {
    let mut lengths = [8u8; 288];
    for slot in lengths.iter_mut().take(256).skip(144) {
        *slot = 9;
    }
    for slot in lengths.iter_mut().take(280).skip(256) {
        *slot = 7;
    }
    lengths
}

/// The fixed literal/length tree.
pub fn fixed_litlen_tree() -> &'static HuffmanTree {
    static TREE: std::sync::OnceLock<HuffmanTree> = std::sync::OnceLock::new();
    TREE.get_or_init(|| {
        HuffmanTree::new(&fixed_litlen_lengths()).expect("fixed literal tree is well formed")
    })
}

/// The fixed distance tree: 5-bit codes for symbols 0..30.
pub fn fixed_distance_tree() -> &'static HuffmanTree {
    static TREE: std::sync::OnceLock<HuffmanTree> = std::sync::OnceLock::new();
    TREE.get_or_init(|| {
        HuffmanTree::new(&[5u8; 30]).expect("fixed distance tree is well formed")
    })
}
