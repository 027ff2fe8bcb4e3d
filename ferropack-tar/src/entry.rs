//! Archive entry metadata.

use crate::header::{
    TYPE_DIRECTORY, TYPE_HARD_LINK, TYPE_REGULAR, TYPE_REGULAR_OLD, TYPE_SYMLINK, TarHeader,
};
use std::time::{SystemTime, UNIX_EPOCH};

/// What kind of filesystem object an entry describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Regular file.
    File,
    /// Directory.
    Directory,
    /// Symbolic link.
    Symlink,
    /// Hard link.
    HardLink,
    /// Anything else; data is skipped structurally.
    Other(u8),
}

/// One archive entry: metadata plus the size of the data that follows.
#[derive(Debug, Clone)]
pub struct TarEntry {
    /// Entry name, `/`-separated.
    pub name: String,
    /// Unix permission bits.
    pub mode: u32,
    /// Owner id.
    pub uid: u64,
    /// Group id.
    pub gid: u64,
    /// Data size in bytes.
    pub size: u64,
    /// Modification time, seconds since the epoch.
    pub mtime: u64,
    /// Entry kind.
    pub kind: EntryKind,
    /// Link target for links.
    pub link_target: String,
    /// Owner name.
    pub uname: String,
    /// Group name.
    pub gname: String,
}

impl TarEntry {
    /// Create a regular-file entry stamped with the current time.
    pub fn file(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            mode: 0o644,
            uid: 0,
            gid: 0,
            size,
            mtime: now(),
            kind: EntryKind::File,
            link_target: String::new(),
            uname: String::new(),
            gname: String::new(),
        }
    }

    /// Create a directory entry; a trailing slash is added if missing.
    pub fn directory(name: impl Into<String>) -> Self {
        let mut name = name.into();
        if !name.ends_with('/') {
            name.push('/');
        }
        Self {
            mode: 0o755,
            size: 0,
            kind: EntryKind::Directory,
            ..Self::file(name, 0)
        }
    }

    /// Create a symlink entry.
    pub fn symlink(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            mode: 0o777,
            kind: EntryKind::Symlink,
            link_target: target.into(),
            ..Self::file(name, 0)
        }
    }

    /// Whether this entry is a directory.
    pub fn is_directory(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    /// Whether this entry is a regular file.
    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    pub(crate) fn from_header(header: &TarHeader) -> Self {
        let kind = match header.typeflag {
            TYPE_REGULAR | TYPE_REGULAR_OLD => EntryKind::File,
            TYPE_DIRECTORY => EntryKind::Directory,
            TYPE_SYMLINK => EntryKind::Symlink,
            TYPE_HARD_LINK => EntryKind::HardLink,
            other => EntryKind::Other(other),
        };
        // Directories are also recognised by a trailing slash in pre-USTAR
        // archives.
        let kind = if kind == EntryKind::File && header.name.ends_with('/') {
            EntryKind::Directory
        } else {
            kind
        };
        Self {
            name: header.name.clone(),
            mode: header.mode,
            uid: header.uid,
            gid: header.gid,
            size: header.size,
            mtime: header.mtime,
            kind,
            link_target: header.linkname.clone(),
            uname: header.uname.clone(),
            gname: header.gname.clone(),
        }
    }

    pub(crate) fn typeflag(&self) -> u8 {
        match self.kind {
            EntryKind::File => TYPE_REGULAR,
            EntryKind::Directory => TYPE_DIRECTORY,
            EntryKind::Symlink => TYPE_SYMLINK,
            EntryKind::HardLink => TYPE_HARD_LINK,
            EntryKind::Other(flag) => flag,
        }
    }
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_gets_trailing_slash() {
        let entry = TarEntry::directory("docs");
        assert_eq!(entry.name, "docs/");
        assert!(entry.is_directory());
    }

    #[test]
    fn test_file_constructor() {
        let entry = TarEntry::file("a.txt", 42);
        assert!(entry.is_file());
        assert_eq!(entry.size, 42);
        assert!(entry.mtime > 0);
    }
}
