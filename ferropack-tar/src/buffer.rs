//! Record-level buffering over the underlying byte stream.
//!
//! Tar I/O historically happens in records of `block_factor * 512` bytes
//! (20 by default). The reader pulls whole records, zero-filling a short
//! final one; the writer accumulates blocks and pads the last record to
//! full size when the archive is finished.

use crate::header::BLOCK_SIZE;
use ferropack_core::error::Result;
use std::io::{Read, Write};

/// Default blocking factor (10 KiB records).
pub const DEFAULT_BLOCK_FACTOR: usize = 20;

/// Record-buffered block reader.
pub struct RecordReader<R: Read> {
    reader: R,
    record: Vec<u8>,
    /// Next block index within the record.
    current_block: usize,
    block_factor: usize,
    /// Blocks actually backed by stream data in the current record.
    valid_blocks: usize,
}

impl<R: Read> RecordReader<R> {
    /// Create a reader with the given blocking factor.
    pub fn new(reader: R, block_factor: usize) -> Self {
        let block_factor = block_factor.max(1);
        Self {
            reader,
            record: vec![0u8; block_factor * BLOCK_SIZE],
            current_block: block_factor,
            block_factor,
            valid_blocks: 0,
        }
    }

    /// Read the next 512-byte block, or `None` at end of stream.
    pub fn read_block(&mut self) -> Result<Option<[u8; BLOCK_SIZE]>> {
        if self.current_block >= self.valid_blocks {
            if !self.read_record()? {
                return Ok(None);
            }
        }
        let start = self.current_block * BLOCK_SIZE;
        let mut block = [0u8; BLOCK_SIZE];
        block.copy_from_slice(&self.record[start..start + BLOCK_SIZE]);
        self.current_block += 1;
        Ok(Some(block))
    }

    /// Pull the next record, tolerating a short tail by zero-filling.
    /// Returns false when the stream is exhausted.
    fn read_record(&mut self) -> Result<bool> {
        self.record.iter_mut().for_each(|b| *b = 0);
        let mut filled = 0;
        while filled < self.record.len() {
            let n = self.reader.read(&mut self.record[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        if filled == 0 {
            return Ok(false);
        }
        self.current_block = 0;
        // Partial trailing blocks round up; the tail is already zeroed.
        self.valid_blocks = filled.div_ceil(BLOCK_SIZE).min(self.block_factor);
        Ok(true)
    }

    /// Consume the reader, returning the underlying stream.
    pub fn into_inner(self) -> R {
        self.reader
    }
}

/// Record-buffered block writer.
pub struct RecordWriter<W: Write> {
    writer: W,
    record: Vec<u8>,
    current_block: usize,
    block_factor: usize,
}

impl<W: Write> RecordWriter<W> {
    /// Create a writer with the given blocking factor.
    pub fn new(writer: W, block_factor: usize) -> Self {
        let block_factor = block_factor.max(1);
        Self {
            writer,
            record: vec![0u8; block_factor * BLOCK_SIZE],
            current_block: 0,
            block_factor,
        }
    }

    /// Append one 512-byte block, flushing the record when it fills.
    pub fn write_block(&mut self, block: &[u8; BLOCK_SIZE]) -> Result<()> {
        let start = self.current_block * BLOCK_SIZE;
        self.record[start..start + BLOCK_SIZE].copy_from_slice(block);
        self.current_block += 1;
        if self.current_block == self.block_factor {
            self.flush_record()?;
        }
        Ok(())
    }

    /// Pad the current record with zero blocks and flush it.
    pub fn finish(&mut self) -> Result<()> {
        if self.current_block > 0 {
            // Remaining blocks in the record are already zero.
            self.flush_record()?;
        }
        self.writer.flush()?;
        Ok(())
    }

    fn flush_record(&mut self) -> Result<()> {
        self.writer.write_all(&self.record)?;
        self.record.iter_mut().for_each(|b| *b = 0);
        self.current_block = 0;
        Ok(())
    }

    /// Consume the writer, returning the underlying stream.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// Whether a block is an end-of-archive marker (all zeros).
pub fn is_end_of_archive_block(block: &[u8; BLOCK_SIZE]) -> bool {
    block.iter().all(|&b| b == 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_short_final_record_zero_filled() {
        // One and a half blocks of data.
        let mut data = vec![0xAAu8; BLOCK_SIZE + 256];
        data[0] = 1;
        let mut reader = RecordReader::new(Cursor::new(data), DEFAULT_BLOCK_FACTOR);

        let first = reader.read_block().unwrap().unwrap();
        assert_eq!(first[0], 1);
        let second = reader.read_block().unwrap().unwrap();
        assert_eq!(&second[..256], &[0xAA; 256][..]);
        assert_eq!(&second[256..], &[0u8; 256][..]);
        assert!(reader.read_block().unwrap().is_none());
    }

    #[test]
    fn test_writer_pads_record() {
        let mut writer = RecordWriter::new(Vec::new(), 4);
        writer.write_block(&[1u8; BLOCK_SIZE]).unwrap();
        writer.finish().unwrap();
        let out = writer.into_inner();
        assert_eq!(out.len(), 4 * BLOCK_SIZE);
        assert_eq!(out[0], 1);
        assert!(out[BLOCK_SIZE..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_writer_flushes_full_records() {
        let mut writer = RecordWriter::new(Vec::new(), 2);
        for i in 0..4u8 {
            writer.write_block(&[i; BLOCK_SIZE]).unwrap();
        }
        let out = writer.into_inner();
        assert_eq!(out.len(), 4 * BLOCK_SIZE);
        assert_eq!(out[3 * BLOCK_SIZE], 3);
    }

    #[test]
    fn test_end_of_archive_detection() {
        assert!(is_end_of_archive_block(&[0u8; BLOCK_SIZE]));
        let mut block = [0u8; BLOCK_SIZE];
        block[511] = 1;
        assert!(!is_end_of_archive_block(&block));
    }
}
