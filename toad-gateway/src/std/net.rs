use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::time::Duration;

use crate::net::{io_to_nb, Endpoint, Link};

/// Bind an ephemeral socket of the right address family
/// and connect it to `endpoint`.
///
/// Reads on the socket block for at most `poll_interval`.
pub fn connect(endpoint: &Endpoint, poll_interval: Duration) -> io::Result<UdpSocket> {
  let addr = endpoint.resolve()?;
  let local: SocketAddr = match addr {
    | SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
    | SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
  };

  let sock = UdpSocket::bind(local)?;
  sock.connect(addr)?;
  sock.set_read_timeout(Some(poll_interval))?;

  log::trace!("{} -> {}", sock.local_addr()?, addr);
  Ok(sock)
}

fn timeout_is_would_block(e: io::Error) -> io::Error {
  match e.kind() {
    // windows reports read timeouts as TimedOut
    | io::ErrorKind::TimedOut => io::Error::from(io::ErrorKind::WouldBlock),
    | _ => e,
  }
}

/// A plaintext link: a connected UDP socket
#[derive(Debug)]
pub struct UdpLink(Option<UdpSocket>);

impl UdpLink {
  /// Wrap a connected socket
  pub fn new(sock: UdpSocket) -> Self {
    Self(Some(sock))
  }

  fn sock(&self) -> io::Result<&UdpSocket> {
    self.0
        .as_ref()
        .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))
  }
}

impl Link for UdpLink {
  fn send(&mut self, dgram: &[u8]) -> io::Result<()> {
    self.sock()?.send(dgram).map(|_| ())
  }

  fn poll_recv(&mut self, buf: &mut [u8]) -> nb::Result<usize, io::Error> {
    self.sock()
        .and_then(|sock| sock.recv(buf))
        .map_err(io_to_nb)
  }

  fn shutdown(&mut self) {
    self.0.take();
  }
}

/// A connected UDP socket presented as a byte stream,
/// so that openssl can run DTLS over it.
///
/// Every `write` is sent immediately as its own datagram and
/// every `read` receives one datagram.
#[derive(Debug)]
pub struct UdpStream(UdpSocket);

impl UdpStream {
  /// Wrap a connected socket
  pub fn new(sock: UdpSocket) -> Self {
    Self(sock)
  }
}

impl io::Write for UdpStream {
  fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
    self.0.send(buf)
  }

  fn flush(&mut self) -> io::Result<()> {
    Ok(())
  }
}

impl io::Read for UdpStream {
  fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
    self.0.recv(buf).map_err(timeout_is_would_block)
  }
}
