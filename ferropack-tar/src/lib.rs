//! USTAR/GNU/PAX tar archives for Ferropack.
//!
//! A streaming engine over plain byte streams: [`TarReader`] iterates
//! entries from any `Read`, [`TarWriter`] builds archives into any
//! `Write`. Long names travel as GNU 'L' pseudo entries, PAX extended
//! headers are parsed and applied, and extraction refuses paths that
//! escape the destination root.
//!
//! Compressed archives are a composition: wrap the byte stream with a
//! codec (for example `ferropack_deflate`) before handing it here.
//!
//! ## Example
//!
//! ```rust
//! use ferropack_tar::{TarEntry, TarReader, TarWriter};
//!
//! let mut writer = TarWriter::new(Vec::new());
//! writer.add_entry(&TarEntry::file("hello.txt", 5), b"HELLO").unwrap();
//! let archive = writer.into_inner().unwrap();
//!
//! let mut reader = TarReader::new(archive.as_slice());
//! let entry = reader.next_entry().unwrap().unwrap();
//! assert_eq!(entry.name, "hello.txt");
//! assert_eq!(reader.read_data_to_vec().unwrap(), b"HELLO");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod buffer;
pub mod entry;
pub mod extended;
pub mod header;
pub mod reader;
pub mod writer;

pub use buffer::{DEFAULT_BLOCK_FACTOR, is_end_of_archive_block};
pub use entry::{EntryKind, TarEntry};
pub use header::{BLOCK_SIZE, TarHeader};
pub use reader::{TarReader, safe_destination};
pub use writer::{TarOptions, TarWriter};
