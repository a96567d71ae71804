//! In-process transport over a pair of channels.
//!
//! The backbone of every two-engine test, and useful in production for
//! wiring an engine to a local relay thread.

use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use tracing::debug;

use super::{Transport, TransportError};

/// One end of an in-memory buffer pipe.
pub struct MemoryTransport {
    sender: Sender<Vec<u8>>,
    receiver: Receiver<Vec<u8>>,
    label: String,
}

impl MemoryTransport {
    /// Creates a connected pair of transports; buffers sent on one end
    /// arrive on the other.
    #[must_use]
    pub fn pair() -> (Self, Self) {
        let (a_to_b_tx, a_to_b_rx) = unbounded();
        let (b_to_a_tx, b_to_a_rx) = unbounded();
        (
            Self {
                sender: a_to_b_tx,
                receiver: b_to_a_rx,
                label: "memory:a".to_string(),
            },
            Self {
                sender: b_to_a_tx,
                receiver: a_to_b_rx,
                label: "memory:b".to_string(),
            },
        )
    }

    /// Number of buffers waiting to be received on this end.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }
}

impl Transport for MemoryTransport {
    fn send(&mut self, buffer: &[u8]) -> Result<(), TransportError> {
        self.sender
            .send(buffer.to_vec())
            .map_err(|_| TransportError::Disconnected)
    }

    fn try_recv(&mut self) -> Option<Vec<u8>> {
        match self.receiver.try_recv() {
            Ok(buffer) => Some(buffer),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                debug!(label = %self.label, "peer end dropped");
                None
            }
        }
    }

    fn label(&self) -> &str {
        &self.label
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_delivers_both_directions() {
        let (mut a, mut b) = MemoryTransport::pair();
        a.send(&[1, 2, 3]).unwrap();
        b.send(&[9]).unwrap();

        assert_eq!(b.try_recv(), Some(vec![1, 2, 3]));
        assert_eq!(a.try_recv(), Some(vec![9]));
        assert_eq!(a.try_recv(), None);
    }

    #[test]
    fn test_send_to_dropped_peer_fails() {
        let (mut a, b) = MemoryTransport::pair();
        drop(b);
        assert!(matches!(
            a.send(&[1]),
            Err(TransportError::Disconnected)
        ));
    }
}
