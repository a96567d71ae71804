//! # Wire Protocol
//!
//! Length-prefixed binary frames carrying component state between
//! engine instances, and the merge path that folds a received buffer
//! into a [`World`](strata_core::World).
//!
//! A buffer is a concatenation of frames; each frame is one component
//! operation. Peers exchange buffers, not frames, so a transport only
//! ever sees opaque byte blobs.

mod frame;
mod merge;

pub use frame::{
    Frame, FrameBatch, FrameCursor, FrameHeader, ProtocolError, WireOp, FRAME_PREFIX_SIZE,
    HEADER_SIZE,
};
pub use merge::{merge_buffer, AcceptedFrame, MergeOutcome, MergeReport};
