//! # Transports
//!
//! A transport carries opaque frame buffers between two engine
//! instances. The engine polls transports once per frame; transports
//! never call back into the engine, so the world stays single-threaded
//! even when a transport is backed by sockets or threads.

use std::io;

use thiserror::Error;

use crate::protocol::FrameHeader;

mod memory;
mod recorder;
mod udp;

pub use memory::MemoryTransport;
pub use recorder::{RecorderHandle, RecorderTransport};
pub use udp::{UdpStats, UdpTransport, MAX_DATAGRAM};

/// Errors surfaced by a transport send.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The peer end has been dropped; no further delivery is possible.
    #[error("transport peer disconnected")]
    Disconnected,

    /// An I/O failure on a socket-backed transport.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// A bidirectional buffer pipe between engine instances.
pub trait Transport {
    /// Hands one outgoing buffer to the transport.
    ///
    /// An `Err` means the buffer was not delivered; the engine keeps
    /// the underlying writes dirty and retries next frame, unless
    /// another attached transport delivered them first.
    fn send(&mut self, buffer: &[u8]) -> Result<(), TransportError>;

    /// Largest buffer this transport can carry in one `send`, if any.
    ///
    /// The engine splits outgoing traffic at frame boundaries so no
    /// buffer handed to [`Transport::send`] exceeds this limit.
    fn max_buffer(&self) -> Option<usize> {
        None
    }

    /// Polls for one received buffer, without blocking.
    fn try_recv(&mut self) -> Option<Vec<u8>>;

    /// Whether a frame should be sent over this transport.
    ///
    /// Applied per frame on both the outgoing drain and the
    /// rebroadcast path. The default accepts everything; a transport
    /// bridging to a relay can veto, say, frames for component ids it
    /// does not replicate.
    fn filter(&self, header: &FrameHeader) -> bool {
        let _ = header;
        true
    }

    /// Short name for logs.
    fn label(&self) -> &str;
}
