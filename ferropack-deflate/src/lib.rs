//! DEFLATE (RFC 1951) and zlib (RFC 1950) for Ferropack.
//!
//! Both engines are cooperative state machines: they consume input through
//! `set_input`, produce output into caller buffers, and suspend instead of
//! blocking when either side runs dry.
//!
//! - [`Inflater`] decodes stored, static-Huffman and dynamic-Huffman
//!   blocks through a 32 KiB sliding window.
//! - [`Deflater`] compresses with hashed sliding-window LZ77 (greedy or
//!   lazy matching by level) and picks the cheapest of dynamic, static or
//!   stored encoding per block.
//!
//! ## Example
//!
//! ```rust
//! use ferropack_deflate::{deflate, inflate};
//!
//! let original = b"Hello, World! Hello, World!";
//! let compressed = deflate(original, 6).unwrap();
//! let decompressed = inflate(&compressed).unwrap();
//! assert_eq!(&decompressed, original);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

mod deflate;
mod engine;
mod huffman;
mod inflate;
mod input;
mod pending;
mod tree;
mod window;

pub use deflate::{Deflater, deflate, zlib_compress};
pub use engine::DeflateStrategy;
pub use inflate::{Inflater, inflate, zlib_decompress};
pub use window::WINDOW_SIZE;
