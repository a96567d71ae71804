//! # Byte Writer
//!
//! Append-only encoder for component values and wire frames.
//!
//! The writer owns a growable buffer and never fails: running out of
//! space is not a schema condition. Size policy (payload caps) is
//! enforced by the protocol layer, not here.

use bytemuck::{bytes_of, Pod};

/// Append-only little-endian encoder.
///
/// # Example
///
/// ```rust,ignore
/// let mut w = ByteWriter::new();
/// w.write_u32(7);
/// w.write_str("hello");
/// let bytes = w.into_bytes();
/// ```
#[derive(Debug, Default)]
pub struct ByteWriter {
    buffer: Vec<u8>,
}

impl ByteWriter {
    /// Creates a new empty writer.
    #[must_use]
    pub const fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Creates a writer with pre-reserved capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    /// Returns the number of bytes written.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns true if no bytes have been written.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Returns a slice of the written data.
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    /// Consumes the writer, returning the encoded bytes.
    #[inline]
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Clears the buffer for reuse, keeping its capacity.
    #[inline]
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Writes a single byte.
    #[inline]
    pub fn write_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    /// Writes a u16 in little-endian format.
    #[inline]
    pub fn write_u16(&mut self, value: u16) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a u32 in little-endian format.
    #[inline]
    pub fn write_u32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a u64 in little-endian format.
    #[inline]
    pub fn write_u64(&mut self, value: u64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes an i8.
    #[inline]
    pub fn write_i8(&mut self, value: i8) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes an i16 in little-endian format.
    #[inline]
    pub fn write_i16(&mut self, value: i16) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes an i32 in little-endian format.
    #[inline]
    pub fn write_i32(&mut self, value: i32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes an i64 in little-endian format.
    #[inline]
    pub fn write_i64(&mut self, value: i64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes an f32 as fixed-width IEEE-754 little-endian.
    #[inline]
    pub fn write_f32(&mut self, value: f32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes an f64 as fixed-width IEEE-754 little-endian.
    #[inline]
    pub fn write_f64(&mut self, value: f64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a bool as a single 0/1 byte.
    #[inline]
    pub fn write_bool(&mut self, value: bool) {
        self.buffer.push(u8::from(value));
    }

    /// Writes a raw byte blob with a u32 length prefix.
    #[inline]
    pub fn write_bytes(&mut self, value: &[u8]) {
        self.write_u32(value.len() as u32);
        self.buffer.extend_from_slice(value);
    }

    /// Appends bytes verbatim, without a length prefix.
    ///
    /// For framing layers that manage their own lengths.
    #[inline]
    pub fn write_raw(&mut self, value: &[u8]) {
        self.buffer.extend_from_slice(value);
    }

    /// Writes a UTF-8 string with a u32 length prefix.
    #[inline]
    pub fn write_str(&mut self, value: &str) {
        self.write_bytes(value.as_bytes());
    }

    /// Writes a `Pod` type directly as its raw little-endian bytes.
    #[inline]
    pub fn write_pod<T: Pod>(&mut self, value: &T) {
        self.buffer.extend_from_slice(bytes_of(value));
    }

    /// Writes an optional value: a one-byte presence marker, then the
    /// value if present.
    ///
    /// Absence is an explicit marker, never an omission, so a missing
    /// nested message is distinguishable from an empty one.
    #[inline]
    pub fn write_option<T, F>(&mut self, value: Option<&T>, mut encode: F)
    where
        F: FnMut(&mut Self, &T),
    {
        match value {
            Some(inner) => {
                self.write_u8(1);
                encode(self, inner);
            }
            None => self.write_u8(0),
        }
    }

    /// Writes a repeated field: a u32 element count, then each element.
    ///
    /// An empty sequence encodes as a zero count, not as absence.
    #[inline]
    pub fn write_seq<T, F>(&mut self, values: &[T], mut encode: F)
    where
        F: FnMut(&mut Self, &T),
    {
        self.write_u32(values.len() as u32);
        for value in values {
            encode(self, value);
        }
    }

    /// Writes a length-prefixed group (nested message).
    ///
    /// The closure writes the group body; the u32 length prefix is
    /// backpatched afterwards. Readers can skip trailing unknown fields
    /// inside a group by consuming the declared length.
    pub fn write_group<F>(&mut self, body: F)
    where
        F: FnOnce(&mut Self),
    {
        let prefix_at = self.buffer.len();
        self.write_u32(0);
        let body_start = self.buffer.len();
        body(self);
        let body_len = (self.buffer.len() - body_start) as u32;
        self.buffer[prefix_at..prefix_at + 4].copy_from_slice(&body_len.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitives_little_endian() {
        let mut w = ByteWriter::new();
        w.write_u16(0x1234);
        w.write_u32(0xAABB_CCDD);
        assert_eq!(w.as_slice(), &[0x34, 0x12, 0xDD, 0xCC, 0xBB, 0xAA]);
    }

    #[test]
    fn test_string_length_prefix() {
        let mut w = ByteWriter::new();
        w.write_str("hi");
        assert_eq!(w.as_slice(), &[2, 0, 0, 0, b'h', b'i']);
    }

    #[test]
    fn test_empty_seq_is_zero_count() {
        let mut w = ByteWriter::new();
        w.write_seq::<u8, _>(&[], |w, v| w.write_u8(*v));
        assert_eq!(w.as_slice(), &[0, 0, 0, 0]);
    }

    #[test]
    fn test_group_backpatch() {
        let mut w = ByteWriter::new();
        w.write_group(|w| {
            w.write_u8(7);
            w.write_u8(9);
        });
        assert_eq!(w.as_slice(), &[2, 0, 0, 0, 7, 9]);
    }

    #[test]
    fn test_option_markers() {
        let mut w = ByteWriter::new();
        w.write_option(Some(&3u8), |w, v| w.write_u8(*v));
        w.write_option::<u8, _>(None, |w, v| w.write_u8(*v));
        assert_eq!(w.as_slice(), &[1, 3, 0]);
    }
}
