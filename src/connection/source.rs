//! Datagram sources

use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;
use tracing::{debug, trace};

use crate::{Result, StreamError};

/// A blocking source of datagrams with a per-call timeout.
///
/// `recv` returns:
/// - `Ok(Some(len))` - a datagram of `len` bytes was written into `buf`
/// - `Ok(None)` - nothing arrived within `timeout` (stream silent, not an error)
/// - `Err(e)` - the socket failed; the connection is over
pub trait DatagramSource: Send + Sync + 'static {
    fn recv(&self, buf: &mut [u8], timeout: Duration) -> io::Result<Option<usize>>;
}

/// UDP socket bound to the capture stream's port
#[derive(Debug)]
pub struct UdpSource {
    socket: UdpSocket,
}

impl UdpSource {
    /// Bind to `addr`.
    pub fn bind(addr: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(addr)
            .map_err(|e| StreamError::socket_error(format!("bind {addr}"), e))?;
        debug!(%addr, "Bound capture socket");
        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket.local_addr().map_err(|e| StreamError::socket_error("local_addr", e))
    }
}

impl DatagramSource for UdpSource {
    fn recv(&self, buf: &mut [u8], timeout: Duration) -> io::Result<Option<usize>> {
        // a zero timeout means "block forever" to the OS
        self.socket.set_read_timeout(Some(timeout.max(Duration::from_millis(1))))?;
        match self.socket.recv(buf) {
            Ok(len) => {
                trace!(len, "Datagram received");
                Ok(Some(len))
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn loopback() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0)
    }

    #[test]
    fn bind_to_ephemeral_port() {
        let source = UdpSource::bind(loopback()).unwrap();
        assert_ne!(source.local_addr().unwrap().port(), 0);
    }

    #[test]
    fn silent_socket_times_out_without_error() {
        let source = UdpSource::bind(loopback()).unwrap();
        let mut buf = [0u8; 64];
        assert_eq!(source.recv(&mut buf, Duration::from_millis(20)).unwrap(), None);
    }

    #[test]
    fn receives_sent_datagram() {
        let source = UdpSource::bind(loopback()).unwrap();
        let sender = UdpSocket::bind(loopback()).unwrap();
        sender.send_to(b"hello", source.local_addr().unwrap()).unwrap();

        let mut buf = [0u8; 64];
        let len = source.recv(&mut buf, Duration::from_secs(2)).unwrap();
        assert_eq!(len, Some(5));
        assert_eq!(&buf[..5], b"hello");
    }

    #[test]
    fn binding_a_taken_port_is_a_socket_error() {
        let first = UdpSource::bind(loopback()).unwrap();
        let taken = first.local_addr().unwrap();
        assert!(matches!(UdpSource::bind(taken), Err(StreamError::Socket { .. })));
    }
}
