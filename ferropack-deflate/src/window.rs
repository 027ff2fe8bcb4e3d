//! Sliding output window for the inflater.
//!
//! DEFLATE back-references reach up to 32 KiB into previously produced
//! output. `OutputWindow` is a circular buffer of that size with separate
//! write and read cursors: the inflater writes into it, the caller drains
//! it with `copy_output`, and `repeat` implements the overlapping-copy
//! semantics of LZ77 matches (a distance smaller than the length replays
//! bytes written moments earlier, i.e. run-length fill).

use crate::input::StreamManipulator;
use ferropack_core::error::{FerropackError, Result};

/// Window size mandated by the format.
pub const WINDOW_SIZE: usize = 1 << 15;

const WINDOW_MASK: usize = WINDOW_SIZE - 1;

/// 32 KiB circular history buffer.
pub struct OutputWindow {
    window: Box<[u8; WINDOW_SIZE]>,
    /// Write cursor (wrapped).
    window_end: usize,
    /// Bytes written but not yet drained by the caller.
    window_filled: usize,
    /// Total bytes ever written, bounding valid back-reference distances.
    total_written: u64,
}

impl OutputWindow {
    /// Create an empty window.
    pub fn new() -> Self {
        Self {
            window: Box::new([0u8; WINDOW_SIZE]),
            window_end: 0,
            window_filled: 0,
            total_written: 0,
        }
    }

    /// Space left before the caller must drain output.
    pub fn get_free_space(&self) -> usize {
        WINDOW_SIZE - self.window_filled
    }

    /// Bytes ready for `copy_output`.
    pub fn get_available(&self) -> usize {
        self.window_filled
    }

    /// Append a single literal byte.
    #[inline]
    pub fn write(&mut self, byte: u8) {
        debug_assert!(self.window_filled < WINDOW_SIZE, "window full");
        self.window[self.window_end] = byte;
        self.window_end = (self.window_end + 1) & WINDOW_MASK;
        self.window_filled += 1;
        self.total_written += 1;
    }

    /// Replay `length` bytes starting `distance` back from the write
    /// cursor. Overlap is intentional: the source may include bytes this
    /// very call has written.
    pub fn repeat(&mut self, length: usize, distance: usize) -> Result<()> {
        debug_assert!(self.window_filled + length <= WINDOW_SIZE);
        if distance == 0 || distance > WINDOW_SIZE || u64::from(distance as u32) > self.total_written
        {
            return Err(FerropackError::corrupt(format!(
                "back-reference distance {distance} exceeds written history"
            )));
        }
        let mut rep_start = (self.window_end.wrapping_sub(distance)) & WINDOW_MASK;
        for _ in 0..length {
            self.window[self.window_end] = self.window[rep_start];
            self.window_end = (self.window_end + 1) & WINDOW_MASK;
            rep_start = (rep_start + 1) & WINDOW_MASK;
        }
        self.window_filled += length;
        self.total_written += length as u64;
        Ok(())
    }

    /// Copy up to `length` stored-block bytes straight from the input.
    /// Returns the number actually copied (bounded by input and free space).
    pub fn copy_stored(&mut self, input: &mut StreamManipulator, length: usize) -> Result<usize> {
        let length = length
            .min(input.available_bytes())
            .min(self.get_free_space());
        if length == 0 {
            return Ok(0);
        }

        let tail_room = WINDOW_SIZE - self.window_end;
        let copied = if length > tail_room {
            let first = input.copy_bytes(&mut self.window[self.window_end..], tail_room)?;
            let mut total = first;
            if first == tail_room {
                total += input.copy_bytes(&mut self.window[..], length - tail_room)?;
            }
            total
        } else {
            input.copy_bytes(
                &mut self.window[self.window_end..self.window_end + length],
                length,
            )?
        };

        self.window_end = (self.window_end + copied) & WINDOW_MASK;
        self.window_filled += copied;
        self.total_written += copied as u64;
        Ok(copied)
    }

    /// Preload a dictionary: it becomes history for back-references but is
    /// never emitted as output.
    pub fn copy_dict(&mut self, dictionary: &[u8]) {
        debug_assert_eq!(self.window_filled, 0);
        let dict = if dictionary.len() > WINDOW_SIZE {
            &dictionary[dictionary.len() - WINDOW_SIZE..]
        } else {
            dictionary
        };
        for &byte in dict {
            self.window[self.window_end] = byte;
            self.window_end = (self.window_end + 1) & WINDOW_MASK;
        }
        self.total_written += dict.len() as u64;
    }

    /// Drain produced bytes into `out`, oldest first. Returns bytes copied.
    pub fn copy_output(&mut self, out: &mut [u8]) -> usize {
        let len = out.len().min(self.window_filled);
        if len == 0 {
            return 0;
        }
        let start = (self.window_end.wrapping_sub(self.window_filled)) & WINDOW_MASK;
        let tail = WINDOW_SIZE - start;
        if len > tail {
            out[..tail].copy_from_slice(&self.window[start..]);
            out[tail..len].copy_from_slice(&self.window[..len - tail]);
        } else {
            out[..len].copy_from_slice(&self.window[start..start + len]);
        }
        self.window_filled -= len;
        len
    }

    /// Reset to the empty state.
    pub fn reset(&mut self) {
        self.window_end = 0;
        self.window_filled = 0;
        self.total_written = 0;
    }
}

impl Default for OutputWindow {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_and_drain() {
        let mut win = OutputWindow::new();
        for b in b"hello" {
            win.write(*b);
        }
        assert_eq!(win.get_available(), 5);
        let mut out = [0u8; 8];
        assert_eq!(win.copy_output(&mut out), 5);
        assert_eq!(&out[..5], b"hello");
        assert_eq!(win.get_available(), 0);
    }

    #[test]
    fn test_overlapping_repeat_is_run_fill() {
        let mut win = OutputWindow::new();
        win.write(b'a');
        win.repeat(5, 1).unwrap();
        let mut out = [0u8; 6];
        assert_eq!(win.copy_output(&mut out), 6);
        assert_eq!(&out, b"aaaaaa");
    }

    #[test]
    fn test_repeat_beyond_history_is_corrupt() {
        let mut win = OutputWindow::new();
        win.write(b'x');
        assert!(matches!(
            win.repeat(3, 2),
            Err(FerropackError::CorruptData { .. })
        ));
    }

    #[test]
    fn test_dictionary_counts_as_history() {
        let mut win = OutputWindow::new();
        win.copy_dict(b"abc");
        win.repeat(3, 3).unwrap();
        let mut out = [0u8; 4];
        assert_eq!(win.copy_output(&mut out), 3);
        assert_eq!(&out[..3], b"abc");
    }

    #[test]
    fn test_wraparound_output() {
        let mut win = OutputWindow::new();
        let mut drained = Vec::new();
        let mut out = [0u8; 4096];
        // Write more than a window's worth in total, draining as we go.
        for round in 0..12u32 {
            for i in 0..4000u32 {
                win.write(((round + i) & 0xFF) as u8);
            }
            let n = win.copy_output(&mut out);
            drained.extend_from_slice(&out[..n]);
        }
        assert_eq!(drained.len(), 48_000);
        for (i, chunk) in drained.chunks(4000).enumerate() {
            for (j, &b) in chunk.iter().enumerate() {
                assert_eq!(b, ((i as u32 + j as u32) & 0xFF) as u8);
            }
        }
    }
}
