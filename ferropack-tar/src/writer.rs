//! Streaming tar writer.
//!
//! `TarWriter` emits USTAR headers and block-padded entry data over any
//! `Write` sink. Names over 100 bytes get a GNU long-name pseudo entry
//! ahead of the real header. Finishing the archive appends the two
//! zero-block end marker and pads the final record.

use crate::buffer::{DEFAULT_BLOCK_FACTOR, RecordWriter};
use crate::entry::TarEntry;
use crate::extended::format_pax_record;
use crate::header::{
    BLOCK_SIZE, GNU_LONGLINK_NAME, TYPE_GNU_LONGLINK, TYPE_GNU_LONGNAME, TYPE_PAX_HEADER,
    TarHeader,
};
use ferropack_core::error::{FerropackError, Result};
use std::io::Write;

/// Caller-adjustable defaults the writer stamps into headers.
#[derive(Debug, Clone)]
pub struct TarOptions {
    /// Default owner id for entries that leave it zero.
    pub uid: u64,
    /// Default group id.
    pub gid: u64,
    /// Default owner name.
    pub uname: String,
    /// Default group name.
    pub gname: String,
    /// Record blocking factor.
    pub block_factor: usize,
}

impl Default for TarOptions {
    fn default() -> Self {
        Self {
            uid: 0,
            gid: 0,
            uname: String::new(),
            gname: String::new(),
            block_factor: DEFAULT_BLOCK_FACTOR,
        }
    }
}

/// Streaming archive writer.
pub struct TarWriter<W: Write> {
    buffer: RecordWriter<W>,
    options: TarOptions,
    /// Declared bytes still expected for the open entry.
    remaining: u64,
    /// Partially filled data block.
    block: [u8; BLOCK_SIZE],
    block_fill: usize,
    finished: bool,
}

impl<W: Write> TarWriter<W> {
    /// Create a writer with default options.
    pub fn new(writer: W) -> Self {
        Self::with_options(writer, TarOptions::default())
    }

    /// Create a writer with explicit options.
    pub fn with_options(writer: W, options: TarOptions) -> Self {
        let block_factor = options.block_factor;
        Self {
            buffer: RecordWriter::new(writer, block_factor),
            options,
            remaining: 0,
            block: [0u8; BLOCK_SIZE],
            block_fill: 0,
            finished: false,
        }
    }

    /// Begin a new entry, synthesising a GNU long-name pseudo entry when
    /// the name does not fit the header.
    pub fn put_next_entry(&mut self, entry: &TarEntry) -> Result<()> {
        if self.finished {
            return Err(FerropackError::invalid_parameter("archive is finished"));
        }
        if self.remaining > 0 || self.block_fill > 0 {
            return Err(FerropackError::invalid_parameter(
                "previous entry was not closed",
            ));
        }

        if entry.name.len() > 100 {
            self.write_gnu_pseudo_entry(TYPE_GNU_LONGNAME, &entry.name)?;
        }
        if entry.link_target.len() > 100 {
            self.write_gnu_pseudo_entry(TYPE_GNU_LONGLINK, &entry.link_target)?;
        }

        let header = self.build_header(entry);
        self.buffer.write_block(&header.to_block()?)?;
        self.remaining = entry.size;
        Ok(())
    }

    /// Append entry data; at most the declared size may be written.
    pub fn write_data(&mut self, mut data: &[u8]) -> Result<()> {
        if data.len() as u64 > self.remaining {
            return Err(FerropackError::invalid_parameter(
                "write exceeds the entry's declared size",
            ));
        }
        while !data.is_empty() {
            let take = data.len().min(BLOCK_SIZE - self.block_fill);
            self.block[self.block_fill..self.block_fill + take].copy_from_slice(&data[..take]);
            self.block_fill += take;
            self.remaining -= take as u64;
            data = &data[take..];
            if self.block_fill == BLOCK_SIZE {
                self.buffer.write_block(&self.block)?;
                self.block = [0u8; BLOCK_SIZE];
                self.block_fill = 0;
            }
        }
        Ok(())
    }

    /// Finish the current entry, zero-padding to the block boundary.
    pub fn close_entry(&mut self) -> Result<()> {
        if self.remaining > 0 {
            return Err(FerropackError::invalid_parameter(format!(
                "entry is missing {} declared bytes",
                self.remaining
            )));
        }
        if self.block_fill > 0 {
            self.buffer.write_block(&self.block)?;
            self.block = [0u8; BLOCK_SIZE];
            self.block_fill = 0;
        }
        Ok(())
    }

    /// Convenience: header plus data plus close in one call.
    pub fn add_entry(&mut self, entry: &TarEntry, data: &[u8]) -> Result<()> {
        self.put_next_entry(entry)?;
        self.write_data(data)?;
        self.close_entry()
    }

    /// Write the end-of-archive marker and flush the final record.
    pub fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.close_entry()?;
        self.buffer.write_block(&[0u8; BLOCK_SIZE])?;
        self.buffer.write_block(&[0u8; BLOCK_SIZE])?;
        self.buffer.finish()?;
        self.finished = true;
        Ok(())
    }

    /// Finish (if needed) and return the underlying writer.
    pub fn into_inner(mut self) -> Result<W> {
        self.finish()?;
        let this = std::mem::ManuallyDrop::new(self);
        // SAFETY: self is consumed and Drop is suppressed, so reading the
        // buffer out does not duplicate ownership.
        Ok(unsafe { std::ptr::read(&this.buffer) }.into_inner())
    }

    fn build_header(&self, entry: &TarEntry) -> TarHeader {
        TarHeader {
            name: if entry.name.len() > 100 {
                truncate_name(&entry.name)
            } else {
                entry.name.clone()
            },
            mode: entry.mode,
            uid: if entry.uid != 0 { entry.uid } else { self.options.uid },
            gid: if entry.gid != 0 { entry.gid } else { self.options.gid },
            size: entry.size,
            mtime: entry.mtime,
            typeflag: entry.typeflag(),
            linkname: if entry.link_target.len() > 100 {
                String::from_utf8_lossy(&entry.link_target.as_bytes()[..100]).into_owned()
            } else {
                entry.link_target.clone()
            },
            ustar: true,
            uname: if entry.uname.is_empty() {
                self.options.uname.clone()
            } else {
                entry.uname.clone()
            },
            gname: if entry.gname.is_empty() {
                self.options.gname.clone()
            } else {
                entry.gname.clone()
            },
            dev_major: 0,
            dev_minor: 0,
        }
    }

    /// Emit a GNU 'L'/'K' pseudo entry carrying a long string.
    fn write_gnu_pseudo_entry(&mut self, typeflag: u8, value: &str) -> Result<()> {
        log::debug!("synthesising GNU pseudo entry for {} bytes", value.len());
        let header = TarHeader {
            name: GNU_LONGLINK_NAME.to_string(),
            mode: 0o644,
            size: value.len() as u64 + 1,
            typeflag,
            ustar: true,
            ..Default::default()
        };
        self.buffer.write_block(&header.to_block()?)?;

        let mut data = value.as_bytes().to_vec();
        data.push(0);
        for chunk in data.chunks(BLOCK_SIZE) {
            let mut block = [0u8; BLOCK_SIZE];
            block[..chunk.len()].copy_from_slice(chunk);
            self.buffer.write_block(&block)?;
        }
        Ok(())
    }

    /// Emit a PAX extended header entry for the following real entry.
    pub fn put_pax_entry(&mut self, records: &[(&str, &str)]) -> Result<()> {
        let mut payload = String::new();
        for (key, value) in records {
            payload.push_str(&format_pax_record(key, value));
        }
        let header = TarHeader {
            name: "PaxHeader".to_string(),
            mode: 0o644,
            size: payload.len() as u64,
            typeflag: TYPE_PAX_HEADER,
            ustar: true,
            ..Default::default()
        };
        self.buffer.write_block(&header.to_block()?)?;
        for chunk in payload.as_bytes().chunks(BLOCK_SIZE) {
            let mut block = [0u8; BLOCK_SIZE];
            block[..chunk.len()].copy_from_slice(chunk);
            self.buffer.write_block(&block)?;
        }
        Ok(())
    }
}

impl<W: Write> Drop for TarWriter<W> {
    fn drop(&mut self) {
        if !self.finished {
            // Best-effort end marker so the sink holds a valid archive.
            let _ = self.finish();
        }
    }
}

/// Header-field fallback for a long name: keep the tail, which is what a
/// reader without GNU support would most plausibly want to see.
fn truncate_name(name: &str) -> String {
    let bytes = name.as_bytes();
    String::from_utf8_lossy(&bytes[bytes.len() - 100..]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unclosed_entry_rejected() {
        let mut writer = TarWriter::new(Vec::new());
        writer
            .put_next_entry(&TarEntry::file("a.txt", 10))
            .unwrap();
        writer.write_data(b"12345").unwrap();
        assert!(matches!(
            writer.put_next_entry(&TarEntry::file("b.txt", 1)),
            Err(FerropackError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_oversized_write_rejected() {
        let mut writer = TarWriter::new(Vec::new());
        writer.put_next_entry(&TarEntry::file("a.txt", 3)).unwrap();
        assert!(matches!(
            writer.write_data(b"too much"),
            Err(FerropackError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_archive_ends_with_zero_blocks() {
        let mut writer = TarWriter::new(Vec::new());
        writer
            .add_entry(&TarEntry::file("x", 1), b"y")
            .unwrap();
        writer.finish().unwrap();
        let out = writer.into_inner().unwrap();
        // Record-padded to the blocking factor.
        assert_eq!(out.len() % (DEFAULT_BLOCK_FACTOR * BLOCK_SIZE), 0);
        assert!(out[2 * BLOCK_SIZE..].iter().all(|&b| b == 0));
    }
}
