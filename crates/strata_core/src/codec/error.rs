//! # Codec Errors
//!
//! Failure modes of the binary codec. A codec error on a received
//! payload is a recoverable wire condition, not a bug: the caller drops
//! the offending value and keeps going.

use thiserror::Error;

/// Errors produced while decoding a binary value.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The buffer ended before the requested number of bytes was read.
    #[error("unexpected end of buffer: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEof {
        /// Bytes the read required.
        needed: usize,
        /// Bytes left in the buffer.
        remaining: usize,
    },

    /// A presence/boolean marker byte held a value other than 0 or 1.
    #[error("invalid marker byte {0:#04x}, expected 0 or 1")]
    InvalidMarker(u8),

    /// A string field was not valid UTF-8.
    #[error("string field is not valid UTF-8")]
    InvalidUtf8,

    /// An enum or union tag was outside the schema's declared range.
    #[error("invalid {what} tag {tag}")]
    InvalidTag {
        /// Name of the enum or union field.
        what: &'static str,
        /// The offending tag value.
        tag: u32,
    },

    /// A length prefix pointed past the end of the enclosing buffer.
    #[error("length prefix {length} exceeds {remaining} remaining bytes")]
    BadLengthPrefix {
        /// The declared length.
        length: usize,
        /// Bytes actually remaining.
        remaining: usize,
    },
}
