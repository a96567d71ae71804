//! Recording transport for capture and replay.
//!
//! Captures every outgoing buffer on a shared tape and replays primed
//! buffers as incoming traffic. Used for golden-trace tests and for
//! debugging a live engine's wire output without a real peer.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{Transport, TransportError};

#[derive(Default)]
struct Tape {
    outgoing: Vec<Vec<u8>>,
    incoming: VecDeque<Vec<u8>>,
}

/// Transport that records sends and replays primed receives.
pub struct RecorderTransport {
    tape: Arc<Mutex<Tape>>,
    label: String,
}

/// Shared handle onto a recorder's tape.
#[derive(Clone)]
pub struct RecorderHandle {
    tape: Arc<Mutex<Tape>>,
}

impl RecorderTransport {
    /// Creates a recorder with a label for logs.
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            tape: Arc::new(Mutex::new(Tape::default())),
            label: label.into(),
        }
    }

    /// Returns a handle for inspecting and priming the tape.
    #[must_use]
    pub fn handle(&self) -> RecorderHandle {
        RecorderHandle {
            tape: Arc::clone(&self.tape),
        }
    }
}

impl RecorderHandle {
    /// Queues a buffer to be delivered as incoming traffic.
    pub fn prime(&self, buffer: Vec<u8>) {
        self.tape.lock().incoming.push_back(buffer);
    }

    /// Takes every recorded outgoing buffer, clearing the tape.
    #[must_use]
    pub fn take_outgoing(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.tape.lock().outgoing)
    }

    /// Number of recorded outgoing buffers.
    #[must_use]
    pub fn outgoing_len(&self) -> usize {
        self.tape.lock().outgoing.len()
    }
}

impl Transport for RecorderTransport {
    fn send(&mut self, buffer: &[u8]) -> Result<(), TransportError> {
        self.tape.lock().outgoing.push(buffer.to_vec());
        Ok(())
    }

    fn try_recv(&mut self) -> Option<Vec<u8>> {
        self.tape.lock().incoming.pop_front()
    }

    fn label(&self) -> &str {
        &self.label
    }
}
