//! Error types for Ferropack operations.
//!
//! One error enum covers all engines. Cooperative suspension ("needs input",
//! "needs output space") is never an error; every variant here is fatal for
//! the operation that raised it.

use std::io;
use thiserror::Error;

/// The main error type for Ferropack operations.
#[derive(Debug, Error)]
pub enum FerropackError {
    /// I/O error from the underlying reader/writer.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Structural violation of a compressed or archive format.
    #[error("Corrupt data: {message}")]
    CorruptData {
        /// Description of the violation.
        message: String,
    },

    /// Input exhausted in the middle of a field the format requires.
    ///
    /// Distinct from cooperative suspension; this is fatal.
    #[error("Unexpected end of input: expected {expected} more bytes")]
    UnexpectedEof {
        /// Number of bytes that were expected but not available.
        expected: usize,
    },

    /// A block CRC, stream CRC, Adler-32, or header checksum failed.
    #[error("Checksum mismatch: expected {expected:#010x}, computed {computed:#010x}")]
    ChecksumMismatch {
        /// Value stored in the stream.
        expected: u32,
        /// Value computed from the data.
        computed: u32,
    },

    /// Caller misuse of an engine API.
    #[error("Invalid parameter: {message}")]
    InvalidParameter {
        /// Description of the misuse.
        message: String,
    },

    /// An archive entry path escapes the extraction root or is absolute
    /// where that is not permitted.
    #[error("Invalid path: {path}")]
    InvalidPath {
        /// The offending path.
        path: String,
    },

    /// An internal invariant was violated. Should be unreachable.
    #[error("Internal error: {message}")]
    InternalError {
        /// Description of the broken invariant.
        message: String,
    },
}

/// Result type alias for Ferropack operations.
pub type Result<T> = std::result::Result<T, FerropackError>;

impl FerropackError {
    /// Create a corrupt data error.
    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::CorruptData {
            message: message.into(),
        }
    }

    /// Create an unexpected end-of-input error.
    pub fn unexpected_eof(expected: usize) -> Self {
        Self::UnexpectedEof { expected }
    }

    /// Create a checksum mismatch error.
    pub fn checksum_mismatch(expected: u32, computed: u32) -> Self {
        Self::ChecksumMismatch { expected, computed }
    }

    /// Create an invalid parameter error.
    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            message: message.into(),
        }
    }

    /// Create an invalid path error.
    pub fn invalid_path(path: impl Into<String>) -> Self {
        Self::InvalidPath { path: path.into() }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FerropackError::corrupt("bad block magic");
        assert!(err.to_string().contains("bad block magic"));

        let err = FerropackError::checksum_mismatch(0x12345678, 0xDEADBEEF);
        assert!(err.to_string().contains("0x12345678"));

        let err = FerropackError::invalid_path("../escape.txt");
        assert!(err.to_string().contains("../escape.txt"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: FerropackError = io_err.into();
        assert!(matches!(err, FerropackError::Io(_)));
    }
}
