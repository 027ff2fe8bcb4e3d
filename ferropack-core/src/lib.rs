//! # Ferropack Core
//!
//! Core components for the Ferropack compression and archive engines.
//!
//! This crate provides the foundation the codec crates build on:
//!
//! - [`bitstream`]: MSB-first bit-level I/O (the BZip2 bit order)
//! - [`checksum`]: BZip2 CRC-32 and Adler-32
//! - [`error`]: the shared error type
//!
//! ## Architecture
//!
//! Ferropack is a layered stack:
//!
//! ```text
//! ┌────────────────────────────────────────────────┐
//! │ L3: Container                                  │
//! │     ferropack-tar (USTAR/GNU/PAX)              │
//! ├────────────────────────────────────────────────┤
//! │ L2: Codec                                      │
//! │     ferropack-bzip2, ferropack-deflate         │
//! ├────────────────────────────────────────────────┤
//! │ L1: Foundation (this crate)                    │
//! │     BitReader/BitWriter, checksums, errors     │
//! └────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use ferropack_core::bitstream::BitReader;
//! use ferropack_core::checksum::StreamCrc32;
//! use std::io::Cursor;
//!
//! let data = vec![0xAB, 0xCD];
//! let mut reader = BitReader::new(Cursor::new(data));
//! assert_eq!(reader.read_bits(12).unwrap(), 0xABC);
//!
//! let mut crc = StreamCrc32::new();
//! crc.update(b"123456789");
//! assert_eq!(crc.value(), 0xFC891918);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod bitstream;
pub mod checksum;
pub mod error;

// Re-exports for convenience
pub use bitstream::{BitReader, BitWriter};
pub use checksum::{Adler32, StreamCrc32};
pub use error::{FerropackError, Result};
