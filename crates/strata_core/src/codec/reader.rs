//! # Byte Reader
//!
//! Cursor-based decoder over a received byte slice.
//!
//! Every read is bounds-checked and returns a [`CodecError`] instead of
//! panicking: payloads arrive from the network and must never be able
//! to take the process down.

use bytemuck::Pod;

use super::error::CodecError;

/// Bounds-checked little-endian decoder over a byte slice.
pub struct ByteReader<'a> {
    buffer: &'a [u8],
    position: usize,
}

impl<'a> ByteReader<'a> {
    /// Creates a new reader over a buffer.
    #[must_use]
    pub const fn new(buffer: &'a [u8]) -> Self {
        Self {
            buffer,
            position: 0,
        }
    }

    /// Returns the number of bytes not yet consumed.
    #[inline]
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.position)
    }

    /// Returns true if every byte has been consumed.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Returns the current cursor position.
    #[inline]
    #[must_use]
    pub const fn position(&self) -> usize {
        self.position
    }

    fn take(&mut self, count: usize) -> Result<&'a [u8], CodecError> {
        let remaining = self.remaining();
        if count > remaining {
            return Err(CodecError::UnexpectedEof {
                needed: count,
                remaining,
            });
        }
        let slice = &self.buffer[self.position..self.position + count];
        self.position += count;
        Ok(slice)
    }

    /// Advances the cursor without interpreting the bytes.
    ///
    /// Used to skip unknown trailing data inside a length-prefixed group.
    #[inline]
    pub fn skip(&mut self, count: usize) -> Result<(), CodecError> {
        self.take(count).map(|_| ())
    }

    /// Reads a single byte.
    #[inline]
    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    /// Reads a u16 in little-endian format.
    #[inline]
    pub fn read_u16(&mut self) -> Result<u16, CodecError> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    /// Reads a u32 in little-endian format.
    #[inline]
    pub fn read_u32(&mut self) -> Result<u32, CodecError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Reads a u64 in little-endian format.
    #[inline]
    pub fn read_u64(&mut self) -> Result<u64, CodecError> {
        let bytes = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(raw))
    }

    /// Reads an i8.
    #[inline]
    pub fn read_i8(&mut self) -> Result<i8, CodecError> {
        self.read_u8().map(|v| v as i8)
    }

    /// Reads an i16 in little-endian format.
    #[inline]
    pub fn read_i16(&mut self) -> Result<i16, CodecError> {
        self.read_u16().map(|v| v as i16)
    }

    /// Reads an i32 in little-endian format.
    #[inline]
    pub fn read_i32(&mut self) -> Result<i32, CodecError> {
        self.read_u32().map(|v| v as i32)
    }

    /// Reads an i64 in little-endian format.
    #[inline]
    pub fn read_i64(&mut self) -> Result<i64, CodecError> {
        self.read_u64().map(|v| v as i64)
    }

    /// Reads an f32 from fixed-width IEEE-754 little-endian bytes.
    #[inline]
    pub fn read_f32(&mut self) -> Result<f32, CodecError> {
        self.read_u32().map(f32::from_bits)
    }

    /// Reads an f64 from fixed-width IEEE-754 little-endian bytes.
    #[inline]
    pub fn read_f64(&mut self) -> Result<f64, CodecError> {
        self.read_u64().map(f64::from_bits)
    }

    /// Reads a bool from a 0/1 marker byte.
    ///
    /// Any other byte value is a decode error, not a truthy value.
    #[inline]
    pub fn read_bool(&mut self) -> Result<bool, CodecError> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(CodecError::InvalidMarker(other)),
        }
    }

    /// Reads a u32-length-prefixed byte blob.
    #[inline]
    pub fn read_bytes(&mut self) -> Result<&'a [u8], CodecError> {
        let length = self.read_u32()? as usize;
        let remaining = self.remaining();
        if length > remaining {
            return Err(CodecError::BadLengthPrefix { length, remaining });
        }
        self.take(length)
    }

    /// Reads a u32-length-prefixed UTF-8 string.
    #[inline]
    pub fn read_str(&mut self) -> Result<String, CodecError> {
        let bytes = self.read_bytes()?;
        String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::InvalidUtf8)
    }

    /// Reads a `Pod` type directly from its raw little-endian bytes.
    #[inline]
    pub fn read_pod<T: Pod>(&mut self) -> Result<T, CodecError> {
        let size = std::mem::size_of::<T>();
        let slice = self.take(size)?;
        bytemuck::try_pod_read_unaligned(slice).map_err(|_| CodecError::UnexpectedEof {
            needed: size,
            remaining: 0,
        })
    }

    /// Reads an optional value written by
    /// [`ByteWriter::write_option`](super::ByteWriter::write_option).
    #[inline]
    pub fn read_option<T, F>(&mut self, mut decode: F) -> Result<Option<T>, CodecError>
    where
        F: FnMut(&mut Self) -> Result<T, CodecError>,
    {
        match self.read_u8()? {
            0 => Ok(None),
            1 => decode(self).map(Some),
            other => Err(CodecError::InvalidMarker(other)),
        }
    }

    /// Reads a repeated field written by
    /// [`ByteWriter::write_seq`](super::ByteWriter::write_seq).
    pub fn read_seq<T, F>(&mut self, mut decode: F) -> Result<Vec<T>, CodecError>
    where
        F: FnMut(&mut Self) -> Result<T, CodecError>,
    {
        let count = self.read_u32()? as usize;
        // Cap the pre-reservation: the count is attacker-controlled.
        let mut values = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            values.push(decode(self)?);
        }
        Ok(values)
    }

    /// Reads a length-prefixed group (nested message).
    ///
    /// The closure decodes from a sub-reader scoped to the group body;
    /// any trailing bytes the closure does not consume are skipped,
    /// which is how an older reader tolerates fields added by a newer
    /// writer.
    pub fn read_group<T, F>(&mut self, decode: F) -> Result<T, CodecError>
    where
        F: FnOnce(&mut ByteReader<'_>) -> Result<T, CodecError>,
    {
        let body = self.read_bytes()?;
        let mut sub = ByteReader::new(body);
        decode(&mut sub)
    }
}
