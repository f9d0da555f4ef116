use std::fmt::{self, Debug};
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};

use crate::core::{Error, What, When};
use crate::time::Cancel;

/// Where the gateway lives
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
  /// hostname or IP address (without brackets for IPv6)
  pub host: String,
  /// UDP port
  pub port: u16,
}

impl Endpoint {
  /// Parse `host`, `host:port`, `[v6]` or `[v6]:port`,
  /// using `default_port` when none is present.
  pub fn parse(addr: &str, default_port: u16) -> Result<Self, Error> {
    let invalid = || When::Configuring.what(What::InvalidGateway(addr.to_string()));
    let addr = addr.trim();

    let (host, port) = if let Some(rest) = addr.strip_prefix('[') {
      let (host, after) = rest.split_once(']').ok_or_else(invalid)?;
      match after {
        | "" => (host, None),
        | _ => (host, Some(after.strip_prefix(':').ok_or_else(invalid)?)),
      }
    } else {
      match addr.split_once(':') {
        // more than one colon without brackets: a bare IPv6 address
        | Some((_, rest)) if rest.contains(':') => (addr, None),
        | Some((host, port)) => (host, Some(port)),
        | None => (addr, None),
      }
    };

    if host.is_empty() {
      return Err(invalid());
    }

    let port = match port {
      | Some(port) => port.parse::<u16>().map_err(|_| invalid())?,
      | None => default_port,
    };

    Ok(Endpoint { host: host.to_string(),
                  port })
  }

  /// Resolve to the first socket address the system gives us
  pub fn resolve(&self) -> io::Result<SocketAddr> {
    (self.host.as_str(), self.port).to_socket_addrs()?
                                   .next()
                                   .ok_or_else(|| {
                                     io::Error::new(io::ErrorKind::NotFound,
                                                    format!("{} did not resolve", self))
                                   })
  }
}

impl fmt::Display for Endpoint {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.host.contains(':') {
      write!(f, "[{}]:{}", self.host, self.port)
    } else {
      write!(f, "{}:{}", self.host, self.port)
    }
  }
}

/// DTLS pre-shared key credentials
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Psk {
  /// PSK identity, sent in the clear during the handshake
  pub identity: String,
  /// the shared secret
  pub key: Vec<u8>,
}

impl Debug for Psk {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Psk")
     .field("identity", &self.identity)
     .field("key", &"<redacted>")
     .finish()
  }
}

/// A connected datagram link to the gateway.
///
/// One `send` is one datagram (or one DTLS record) and
/// one successful `poll_recv` is one datagram.
pub trait Link: Debug + Send {
  /// Send a datagram
  fn send(&mut self, dgram: &[u8]) -> io::Result<()>;

  /// Try to receive a datagram into `buf`, yielding how many bytes were written.
  ///
  /// Implementations may block for a short while (the poll interval)
  /// but must yield `WouldBlock` rather than wait indefinitely.
  fn poll_recv(&mut self, buf: &mut [u8]) -> nb::Result<usize, io::Error>;

  /// Tear the link down. After this it must not be used again.
  fn shutdown(&mut self);
}

/// Opens [`Link`]s to the gateway
pub trait Dial: Debug + Send + Sync + 'static {
  /// Plaintext UDP links
  type Plain: Link;
  /// DTLS-secured links
  type Secure: Link;

  /// Open a plaintext link.
  ///
  /// Fails with [`What::SockError`] when the address does not resolve
  /// or a socket cannot be opened.
  fn dial_plain(&self, endpoint: &Endpoint) -> Result<Self::Plain, Error>;

  /// Perform a DTLS handshake authenticated with `psk`.
  ///
  /// Fails with [`What::HandshakeFailure`] on timeout or rejection,
  /// and gives up early (also with `HandshakeFailure`) when `cancel` fires.
  fn dial_secure(&self, endpoint: &Endpoint, psk: &Psk, cancel: &Cancel) -> Result<Self::Secure, Error>;
}

pub(crate) fn io_to_nb(err: io::Error) -> nb::Error<io::Error> {
  match err.kind() {
    | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => nb::Error::WouldBlock,
    | _ => nb::Error::Other(err),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn parse(s: &str) -> Endpoint {
    Endpoint::parse(s, 5683).unwrap()
  }

  #[test]
  fn parse_host_and_port() {
    assert_eq!(parse("10.0.0.2"),
               Endpoint { host: "10.0.0.2".into(),
                          port: 5683 });
    assert_eq!(parse("10.0.0.2:5684").port, 5684);
    assert_eq!(parse(" gw.local:1 ").host, "gw.local");
  }

  #[test]
  fn parse_ipv6() {
    assert_eq!(parse("[::1]:5684"),
               Endpoint { host: "::1".into(),
                          port: 5684 });
    assert_eq!(parse("[fe80::1]").port, 5683);
    assert_eq!(parse("fe80::1").host, "fe80::1");
    assert_eq!(parse("[::1]:5684").to_string(), "[::1]:5684");
  }

  #[test]
  fn parse_rejects_garbage() {
    for bad in ["", ":5683", "host:port", "host:99999", "[::1", "[::1]5683"] {
      let err = Endpoint::parse(bad, 5683).unwrap_err();
      assert!(matches!(err.what, What::InvalidGateway(_)), "{:?}", bad);
    }
  }

  #[test]
  fn psk_debug_hides_key() {
    let psk = Psk { identity: "me".into(),
                    key: b"hunter2".to_vec() };
    assert!(!format!("{:?}", psk).contains("hunter2"));
  }

  #[test]
  fn timeouts_are_would_block() {
    assert!(matches!(io_to_nb(io::Error::from(io::ErrorKind::WouldBlock)),
                     nb::Error::WouldBlock));
    assert!(matches!(io_to_nb(io::Error::from(io::ErrorKind::TimedOut)),
                     nb::Error::WouldBlock));
    assert!(matches!(io_to_nb(io::Error::from(io::ErrorKind::ConnectionRefused)),
                     nb::Error::Other(_)));
  }
}
