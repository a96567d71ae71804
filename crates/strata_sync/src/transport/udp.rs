//! Non-blocking UDP transport.
//!
//! One datagram per buffer, point-to-point. The protocol layer already
//! tolerates loss and reordering (merges are idempotent and totally
//! ordered), so UDP needs no reliability shim; a dropped datagram is
//! re-covered by the dirty-retry path or a later write.

use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

use tracing::{debug, warn};

use super::{Transport, TransportError};

/// Largest datagram this transport will send or receive.
///
/// Conservative MTU floor; buffers larger than this are refused so the
/// engine keeps them dirty rather than relying on IP fragmentation.
pub const MAX_DATAGRAM: usize = 1452;

/// Running totals for one socket.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UdpStats {
    /// Datagrams successfully handed to the socket.
    pub datagrams_sent: u64,
    /// Datagrams received.
    pub datagrams_received: u64,
    /// Payload bytes sent.
    pub bytes_sent: u64,
    /// Payload bytes received.
    pub bytes_received: u64,
}

/// A connected, non-blocking UDP socket.
pub struct UdpTransport {
    socket: UdpSocket,
    label: String,
    recv_buffer: Box<[u8]>,
    stats: UdpStats,
}

impl UdpTransport {
    /// Binds `local` and connects to `remote`.
    pub fn connect(
        local: impl ToSocketAddrs,
        remote: SocketAddr,
    ) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(local)?;
        socket.connect(remote)?;
        socket.set_nonblocking(true)?;
        let label = format!("udp:{remote}");
        debug!(%label, local = ?socket.local_addr(), "socket connected");
        Ok(Self {
            socket,
            label,
            recv_buffer: vec![0u8; MAX_DATAGRAM].into_boxed_slice(),
            stats: UdpStats::default(),
        })
    }

    /// Current socket totals.
    #[must_use]
    pub fn stats(&self) -> UdpStats {
        self.stats
    }
}

impl Transport for UdpTransport {
    fn send(&mut self, buffer: &[u8]) -> Result<(), TransportError> {
        if buffer.len() > MAX_DATAGRAM {
            return Err(TransportError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("buffer of {} bytes exceeds datagram limit", buffer.len()),
            )));
        }
        let written = self.socket.send(buffer)?;
        if written != buffer.len() {
            return Err(TransportError::Io(io::Error::new(
                io::ErrorKind::WriteZero,
                "short datagram write",
            )));
        }
        self.stats.datagrams_sent += 1;
        self.stats.bytes_sent += buffer.len() as u64;
        Ok(())
    }

    fn try_recv(&mut self) -> Option<Vec<u8>> {
        match self.socket.recv(&mut self.recv_buffer) {
            Ok(received) => {
                self.stats.datagrams_received += 1;
                self.stats.bytes_received += received as u64;
                Some(self.recv_buffer[..received].to_vec())
            }
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => None,
            Err(error) => {
                warn!(label = %self.label, %error, "receive failed");
                None
            }
        }
    }

    fn max_buffer(&self) -> Option<usize> {
        Some(MAX_DATAGRAM)
    }

    fn label(&self) -> &str {
        &self.label
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback_pair() -> (UdpTransport, UdpTransport) {
        let a = UdpSocket::bind("127.0.0.1:0").unwrap();
        let b = UdpSocket::bind("127.0.0.1:0").unwrap();
        let a_addr = a.local_addr().unwrap();
        let b_addr = b.local_addr().unwrap();
        drop(a);
        drop(b);
        let a = UdpTransport::connect(a_addr, b_addr).unwrap();
        let b = UdpTransport::connect(b_addr, a_addr).unwrap();
        (a, b)
    }

    #[test]
    fn test_loopback_roundtrip() {
        let (mut a, mut b) = loopback_pair();
        a.send(&[1, 2, 3]).unwrap();

        // Loopback delivery is fast but not instant.
        let mut received = None;
        for _ in 0..100 {
            if let Some(buffer) = b.try_recv() {
                received = Some(buffer);
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
        assert_eq!(received, Some(vec![1, 2, 3]));
        assert_eq!(a.stats().datagrams_sent, 1);
        assert_eq!(b.stats().datagrams_received, 1);
    }

    #[test]
    fn test_oversize_buffer_refused() {
        let (mut a, _b) = loopback_pair();
        let oversize = vec![0u8; MAX_DATAGRAM + 1];
        assert!(a.send(&oversize).is_err());
        assert_eq!(a.stats().datagrams_sent, 0);
    }

    #[test]
    fn test_empty_socket_returns_none() {
        let (_a, mut b) = loopback_pair();
        assert_eq!(b.try_recv(), None);
    }
}
