//! # Frame Encoding
//!
//! One frame per component operation, laid out little-endian:
//!
//! ```text
//! u32 frame_len      bytes after this field (HEADER_SIZE + payload)
//! u32 op             1 = PUT_COMPONENT, 2 = DELETE_COMPONENT,
//!                    3 = APPEND_VALUE
//! u32 component_id
//! u32 entity_id      raw generational handle
//! u32 timestamp      writer's logical clock for this component
//! u32 payload_len    must equal frame_len - HEADER_SIZE
//! [u8] payload       component value in its schema encoding
//! ```
//!
//! The redundant `payload_len` lets a reader reject a corrupted
//! `frame_len` before trusting it to advance the cursor. A structural
//! error (truncation, length mismatch) poisons the rest of the buffer;
//! a semantic error inside one frame never does.

use thiserror::Error;

use strata_core::{ByteWriter, ComponentId, DirtyRecord, DrainOp, EntityId, Timestamp};

/// Size of the fixed header that follows the frame-length prefix.
pub const HEADER_SIZE: usize = 20;

/// Size of the frame-length prefix itself.
pub const FRAME_PREFIX_SIZE: usize = 4;

/// Wire operation discriminant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum WireOp {
    /// Full value replacement for `(entity, component)`.
    Put = 1,
    /// Tombstoned deletion of `(entity, component)`.
    Delete = 2,
    /// Append one element to a grow-only component log.
    Append = 3,
}

impl WireOp {
    /// Decodes a raw discriminant; unknown values are `None`, which
    /// the merge path skips (newer peers may speak newer ops).
    #[must_use]
    pub const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            1 => Some(Self::Put),
            2 => Some(Self::Delete),
            3 => Some(Self::Append),
            _ => None,
        }
    }
}

/// Decoded fixed header of one frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    /// Raw operation discriminant (see [`WireOp::from_raw`]).
    pub op: u32,
    /// Wire id of the component.
    pub component_id: ComponentId,
    /// Target entity handle.
    pub entity_id: EntityId,
    /// Writer's logical timestamp.
    pub timestamp: Timestamp,
    /// Declared payload size in bytes.
    pub payload_len: u32,
}

/// Structural framing errors; any of these poisons the rest of the
/// buffer because the cursor can no longer be trusted.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// The buffer ends before the declared frame does.
    #[error("frame declares {declared} bytes but only {remaining} remain")]
    TruncatedFrame {
        /// Bytes the frame-length prefix declared.
        declared: usize,
        /// Bytes actually left in the buffer.
        remaining: usize,
    },

    /// The frame length and payload length disagree.
    #[error("frame_len {frame_len} does not match payload_len {payload_len}")]
    LengthMismatch {
        /// Value of the frame-length prefix.
        frame_len: u32,
        /// Value of the header's payload-length field.
        payload_len: u32,
    },
}

/// One parsed frame, borrowing the receive buffer.
#[derive(Clone, Copy, Debug)]
pub struct Frame<'a> {
    /// The decoded fixed header.
    pub header: FrameHeader,
    /// The component payload bytes.
    pub payload: &'a [u8],
    /// The complete frame including its length prefix, ready to be
    /// appended verbatim to a rebroadcast buffer.
    pub raw: &'a [u8],
}

/// Batch encoder: appends frames into one outgoing buffer.
#[derive(Debug, Default)]
pub struct FrameBatch {
    writer: ByteWriter,
    frames: usize,
}

impl FrameBatch {
    /// Creates an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of frames appended so far.
    #[must_use]
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// True if nothing has been appended.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames == 0
    }

    /// Appends one frame.
    pub fn push(
        &mut self,
        op: WireOp,
        component_id: ComponentId,
        entity_id: EntityId,
        timestamp: Timestamp,
        payload: &[u8],
    ) {
        let frame_len = (HEADER_SIZE + payload.len()) as u32;
        self.writer.write_u32(frame_len);
        self.writer.write_u32(op as u32);
        self.writer.write_u32(component_id.0);
        self.writer.write_u32(entity_id.raw());
        self.writer.write_u32(timestamp.raw());
        self.writer.write_u32(payload.len() as u32);
        self.writer.write_raw(payload);
        self.frames += 1;
    }

    /// Appends a drained dirty record as its wire frame.
    pub fn push_record(&mut self, record: &DirtyRecord) {
        match &record.op {
            DrainOp::Put(payload) => self.push(
                WireOp::Put,
                record.component_id,
                record.entity,
                record.timestamp,
                payload,
            ),
            DrainOp::Delete => self.push(
                WireOp::Delete,
                record.component_id,
                record.entity,
                record.timestamp,
                &[],
            ),
            DrainOp::Append(payload) => self.push(
                WireOp::Append,
                record.component_id,
                record.entity,
                record.timestamp,
                payload,
            ),
        }
    }

    /// Consumes the batch, returning the outgoing buffer.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.writer.into_bytes()
    }
}

/// Streaming parser over a received buffer.
///
/// Yields one [`Frame`] per iteration. A structural error is yielded
/// once, after which the cursor is exhausted; frames parsed before the
/// error remain valid.
pub struct FrameCursor<'a> {
    buffer: &'a [u8],
    position: usize,
    poisoned: bool,
}

impl<'a> FrameCursor<'a> {
    /// Creates a cursor over a received buffer.
    #[must_use]
    pub const fn new(buffer: &'a [u8]) -> Self {
        Self {
            buffer,
            position: 0,
            poisoned: false,
        }
    }

    /// Byte offset of the next unparsed frame.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.position
    }

    fn read_u32(&mut self) -> Option<u32> {
        let bytes = self.buffer.get(self.position..self.position + 4)?;
        self.position += 4;
        Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

impl<'a> Iterator for FrameCursor<'a> {
    type Item = Result<Frame<'a>, ProtocolError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.poisoned || self.position >= self.buffer.len() {
            return None;
        }
        let frame_start = self.position;
        let remaining = self.buffer.len() - self.position;

        let Some(frame_len) = self.read_u32() else {
            self.poisoned = true;
            return Some(Err(ProtocolError::TruncatedFrame {
                declared: FRAME_PREFIX_SIZE,
                remaining,
            }));
        };
        let declared = frame_len as usize;
        let after_prefix = self.buffer.len() - self.position;
        if declared < HEADER_SIZE || declared > after_prefix {
            self.poisoned = true;
            return Some(Err(ProtocolError::TruncatedFrame {
                declared,
                remaining: after_prefix,
            }));
        }

        // Within bounds from here on; the five header reads cannot fail.
        let op = self.read_u32()?;
        let component_id = ComponentId(self.read_u32()?);
        let entity_id = EntityId::from_raw(self.read_u32()?);
        let timestamp = Timestamp::from_raw(self.read_u32()?);
        let payload_len = self.read_u32()?;

        if payload_len as usize != declared - HEADER_SIZE {
            self.poisoned = true;
            return Some(Err(ProtocolError::LengthMismatch {
                frame_len,
                payload_len,
            }));
        }

        let payload = &self.buffer[self.position..self.position + payload_len as usize];
        self.position += payload_len as usize;

        Some(Ok(Frame {
            header: FrameHeader {
                op,
                component_id,
                entity_id,
                timestamp,
                payload_len,
            },
            payload,
            raw: &self.buffer[frame_start..self.position],
        }))
    }
}
