//! Streaming tar reader.
//!
//! `TarReader` walks an archive entry by entry over any `Read` source.
//! GNU long-name ('L'), long-link ('K') and PAX ('x'/'g') pseudo entries
//! are consumed transparently: their payloads override the following real
//! entry's fields. Entry data is read through the same 512-byte block
//! buffering as the headers, so the caller sees exactly `size` bytes.

use crate::buffer::{DEFAULT_BLOCK_FACTOR, RecordReader};
use crate::entry::{EntryKind, TarEntry};
use crate::extended::{parse_pax_data, parse_pax_mtime};
use crate::header::{BLOCK_SIZE, TarHeader};
use ferropack_core::error::{FerropackError, Result};
use std::collections::HashMap;
use std::io::Read;
use std::path::{Component, Path, PathBuf};

/// Streaming archive reader.
pub struct TarReader<R: Read> {
    buffer: RecordReader<R>,
    /// Unread data bytes of the current entry.
    remaining: u64,
    /// The data block being consumed.
    block: [u8; BLOCK_SIZE],
    /// Read offset within `block`; `BLOCK_SIZE` forces a reload.
    block_pos: usize,
    /// Attributes from 'g' headers, applied to every later entry.
    global_pax: HashMap<String, String>,
}

impl<R: Read> TarReader<R> {
    /// Create a reader with the default blocking factor.
    pub fn new(reader: R) -> Self {
        Self::with_block_factor(reader, DEFAULT_BLOCK_FACTOR)
    }

    /// Create a reader with an explicit blocking factor.
    pub fn with_block_factor(reader: R, block_factor: usize) -> Self {
        Self {
            buffer: RecordReader::new(reader, block_factor),
            remaining: 0,
            block: [0u8; BLOCK_SIZE],
            block_pos: BLOCK_SIZE,
            global_pax: HashMap::new(),
        }
    }

    /// Advance to the next real entry, or `None` at end of archive.
    ///
    /// Any unread data of the current entry is skipped first.
    pub fn next_entry(&mut self) -> Result<Option<TarEntry>> {
        self.skip_current_entry()?;

        let mut long_name: Option<String> = None;
        let mut long_link: Option<String> = None;
        let mut pax: Option<HashMap<String, String>> = None;
        let mut zero_blocks = 0;

        loop {
            let Some(block) = self.buffer.read_block()? else {
                // Stream ended without the marker blocks; tolerated.
                return Ok(None);
            };
            let Some(mut header) = TarHeader::from_block(&block)? else {
                zero_blocks += 1;
                if zero_blocks >= 2 {
                    return Ok(None);
                }
                continue;
            };
            zero_blocks = 0;

            if header.is_gnu_longname() {
                long_name = Some(self.read_pseudo_string(header.size)?);
                log::debug!("long-name entry ({} bytes)", header.size);
                continue;
            }
            if header.is_gnu_longlink() {
                long_link = Some(self.read_pseudo_string(header.size)?);
                continue;
            }
            if header.is_pax_header() {
                let data = self.read_pseudo_data(header.size)?;
                pax = Some(parse_pax_data(&data));
                log::debug!("pax extended header ({} bytes)", header.size);
                continue;
            }
            if header.is_pax_global() {
                let data = self.read_pseudo_data(header.size)?;
                self.global_pax.extend(parse_pax_data(&data));
                continue;
            }

            let global = std::mem::take(&mut self.global_pax);
            apply_pax(&mut header, &global);
            self.global_pax = global;
            if let Some(attrs) = pax.take() {
                apply_pax(&mut header, &attrs);
            }
            if let Some(name) = long_name.take() {
                header.name = name;
            }
            if let Some(link) = long_link.take() {
                header.linkname = link;
            }

            self.remaining = header.size;
            self.block_pos = BLOCK_SIZE;
            return Ok(Some(TarEntry::from_header(&header)));
        }
    }

    /// Read bytes from the current entry's data.
    pub fn read_data(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut copied = 0;
        while copied < buf.len() && self.remaining > 0 {
            if self.block_pos >= BLOCK_SIZE {
                let Some(block) = self.buffer.read_block()? else {
                    return Err(FerropackError::unexpected_eof(self.remaining as usize));
                };
                self.block = block;
                self.block_pos = 0;
            }
            let take = (buf.len() - copied)
                .min(BLOCK_SIZE - self.block_pos)
                .min(self.remaining as usize);
            buf[copied..copied + take]
                .copy_from_slice(&self.block[self.block_pos..self.block_pos + take]);
            self.block_pos += take;
            self.remaining -= take as u64;
            copied += take;
        }
        Ok(copied)
    }

    /// Read the rest of the current entry's data into a vector.
    pub fn read_data_to_vec(&mut self) -> Result<Vec<u8>> {
        let mut data = Vec::with_capacity(self.remaining as usize);
        let mut buf = [0u8; 8192];
        loop {
            let n = self.read_data(&mut buf)?;
            if n == 0 {
                break;
            }
            data.extend_from_slice(&buf[..n]);
        }
        Ok(data)
    }

    /// Extract every remaining entry under `root`.
    ///
    /// Entry names are normalised and must stay inside `root`; absolute
    /// names are made relative first. Link and special entries are skipped.
    pub fn extract_all(&mut self, root: &Path) -> Result<()> {
        std::fs::create_dir_all(root)?;
        while let Some(entry) = self.next_entry()? {
            let dest = safe_destination(root, &entry.name)?;
            match entry.kind {
                EntryKind::Directory => {
                    std::fs::create_dir_all(&dest)?;
                }
                EntryKind::File => {
                    if let Some(parent) = dest.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    let mut file = std::fs::File::create(&dest)?;
                    let mut buf = [0u8; 8192];
                    loop {
                        let n = self.read_data(&mut buf)?;
                        if n == 0 {
                            break;
                        }
                        std::io::Write::write_all(&mut file, &buf[..n])?;
                    }
                }
                _ => {
                    log::debug!("skipping special entry {}", entry.name);
                }
            }
        }
        Ok(())
    }

    /// Consume the reader, returning the underlying stream.
    pub fn into_inner(self) -> R {
        self.buffer.into_inner()
    }

    /// Skip unread data blocks of the current entry.
    fn skip_current_entry(&mut self) -> Result<()> {
        while self.remaining > 0 {
            if self.block_pos >= BLOCK_SIZE {
                if self.buffer.read_block()?.is_none() {
                    return Err(FerropackError::unexpected_eof(self.remaining as usize));
                }
                self.block_pos = 0;
            }
            let skip = (BLOCK_SIZE - self.block_pos).min(self.remaining as usize);
            self.block_pos += skip;
            self.remaining -= skip as u64;
        }
        Ok(())
    }

    /// Read a pseudo entry's payload (long names, PAX records).
    fn read_pseudo_data(&mut self, size: u64) -> Result<Vec<u8>> {
        if size > 1 << 20 {
            return Err(FerropackError::corrupt("oversized extended header"));
        }
        let mut data = vec![0u8; size as usize];
        let blocks = size.div_ceil(BLOCK_SIZE as u64);
        let mut filled = 0;
        for _ in 0..blocks {
            let Some(block) = self.buffer.read_block()? else {
                return Err(FerropackError::unexpected_eof((size - filled as u64) as usize));
            };
            let take = (size as usize - filled).min(BLOCK_SIZE);
            data[filled..filled + take].copy_from_slice(&block[..take]);
            filled += take;
        }
        Ok(data)
    }

    fn read_pseudo_string(&mut self, size: u64) -> Result<String> {
        let data = self.read_pseudo_data(size)?;
        Ok(String::from_utf8_lossy(&data)
            .trim_end_matches('\0')
            .to_string())
    }
}

impl<R: Read> Read for TarReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self.read_data(buf) {
            Ok(n) => Ok(n),
            Err(FerropackError::Io(e)) => Err(e),
            Err(e) => Err(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
        }
    }
}

fn apply_pax(header: &mut TarHeader, attrs: &HashMap<String, String>) {
    if let Some(path) = attrs.get("path") {
        header.name = path.clone();
    }
    if let Some(link) = attrs.get("linkpath") {
        header.linkname = link.clone();
    }
    if let Some(size) = attrs.get("size").and_then(|v| v.parse().ok()) {
        header.size = size;
    }
    if let Some(mtime) = attrs.get("mtime").and_then(|v| parse_pax_mtime(v)) {
        header.mtime = mtime;
    }
    if let Some(uid) = attrs.get("uid").and_then(|v| v.parse().ok()) {
        header.uid = uid;
    }
    if let Some(gid) = attrs.get("gid").and_then(|v| v.parse().ok()) {
        header.gid = gid;
    }
    if let Some(uname) = attrs.get("uname") {
        header.uname = uname.clone();
    }
    if let Some(gname) = attrs.get("gname") {
        header.gname = gname.clone();
    }
}

/// Join an entry name onto the extraction root, rejecting any name that
/// escapes it after normalisation.
pub fn safe_destination(root: &Path, name: &str) -> Result<PathBuf> {
    let mut dest = root.to_path_buf();
    let mut depth = 0usize;
    for component in Path::new(name).components() {
        match component {
            // Absolute names are stripped to their relative tail.
            Component::Prefix(_) | Component::RootDir | Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    return Err(FerropackError::invalid_path(name));
                }
                dest.pop();
                depth -= 1;
            }
            Component::Normal(part) => {
                dest.push(part);
                depth += 1;
            }
        }
    }
    if depth == 0 {
        return Err(FerropackError::invalid_path(name));
    }
    Ok(dest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_destination_normal() {
        let dest = safe_destination(Path::new("/tmp/out"), "a/b/c.txt").unwrap();
        assert_eq!(dest, Path::new("/tmp/out/a/b/c.txt"));
    }

    #[test]
    fn test_safe_destination_rejects_escape() {
        assert!(matches!(
            safe_destination(Path::new("/tmp/out"), "../escape.txt"),
            Err(FerropackError::InvalidPath { .. })
        ));
        assert!(matches!(
            safe_destination(Path::new("/tmp/out"), "a/../../escape.txt"),
            Err(FerropackError::InvalidPath { .. })
        ));
    }

    #[test]
    fn test_safe_destination_strips_absolute() {
        let dest = safe_destination(Path::new("/tmp/out"), "/etc/passwd").unwrap();
        assert_eq!(dest, Path::new("/tmp/out/etc/passwd"));
    }

    #[test]
    fn test_safe_destination_internal_dotdot_ok() {
        let dest = safe_destination(Path::new("/tmp/out"), "a/b/../c.txt").unwrap();
        assert_eq!(dest, Path::new("/tmp/out/a/c.txt"));
    }
}
