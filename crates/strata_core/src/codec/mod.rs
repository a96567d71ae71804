//! # Binary Codec
//!
//! Deterministic, schema-driven encoding of component values.
//!
//! ## Design
//!
//! - All integers and floats are fixed-width little-endian
//! - Variable-length fields (strings, blobs, repeated fields) carry a
//!   u32 count/length prefix
//! - Optional fields carry a one-byte presence marker, so an absent
//!   nested message is distinguishable from a present-but-empty one
//! - Nested messages are written as length-prefixed groups, letting an
//!   older reader skip trailing fields written by a newer writer

mod error;
mod reader;
mod writer;

pub use error::CodecError;
pub use reader::ByteReader;
pub use writer::ByteWriter;
