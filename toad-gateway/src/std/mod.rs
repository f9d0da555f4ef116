use std::time::Duration;

use crate::config::Config;
use crate::core::{Error, What, When};
use crate::net::{Dial, Endpoint, Psk};
use crate::time::{self, Cancel};

/// Plain UDP links
pub mod net;
#[doc(inline)]
pub use net::{UdpLink, UdpStream};

/// DTLS-PSK links, via openssl
pub mod dtls;
#[doc(inline)]
pub use dtls::DtlsLink;

/// Opens real sockets to the gateway.
///
/// Plaintext requests get a [`UdpLink`], secure requests
/// a [`DtlsLink`] authenticated with a pre-shared key.
#[derive(Debug, Clone, Copy)]
pub struct UdpDialer {
  handshake_timeout: Duration,
  poll_interval: Duration,
  cipher_list: &'static str,
}

impl UdpDialer {
  /// Create a dialer honoring the handshake, polling and cipher settings in `config`
  pub fn from_config(config: &Config) -> Self {
    Self { handshake_timeout: time::to_duration(config.dtls.handshake_timeout),
           poll_interval: time::to_duration(config.msg.poll_interval).max(Duration::from_millis(1)),
           cipher_list: config.dtls.cipher_list }
  }
}

impl Default for UdpDialer {
  fn default() -> Self {
    Self::from_config(&Config::default())
  }
}

impl Dial for UdpDialer {
  type Plain = UdpLink;
  type Secure = DtlsLink;

  fn dial_plain(&self, endpoint: &Endpoint) -> Result<UdpLink, Error> {
    net::connect(endpoint, self.poll_interval).map(UdpLink::new)
                                              .map_err(|e| {
                                                When::Dialing.what(What::SockError(e))
                                              })
  }

  fn dial_secure(&self, endpoint: &Endpoint, psk: &Psk, cancel: &Cancel) -> Result<DtlsLink, Error> {
    let sock = net::connect(endpoint, self.poll_interval).map_err(|e| {
                 log::debug!("could not open socket to {}: {}", endpoint, e);
                 When::Dialing.what(What::HandshakeFailure)
               })?;

    dtls::handshake(UdpStream::new(sock),
                    endpoint,
                    psk,
                    self.cipher_list,
                    self.handshake_timeout,
                    cancel)
  }
}

#[cfg(test)]
mod tests {
  use std::net::UdpSocket;

  use embedded_time::duration::Milliseconds;

  use super::*;
  use crate::test;

  fn silent_peer() -> (UdpSocket, Endpoint) {
    let sock = UdpSocket::bind("127.0.0.1:0").unwrap();
    let port = sock.local_addr().unwrap().port();
    (sock,
     Endpoint { host: "127.0.0.1".into(),
                port })
  }

  #[test]
  fn from_config() {
    let mut config = Config::default();
    config.msg.poll_interval = Milliseconds(0);
    config.dtls.handshake_timeout = Milliseconds(10);

    let dialer = UdpDialer::from_config(&config);
    assert_eq!(dialer.poll_interval, Duration::from_millis(1));
    assert_eq!(dialer.handshake_timeout, Duration::from_millis(10));
    assert_eq!(dialer.cipher_list, config.dtls.cipher_list);
  }

  #[test]
  fn unanswered_handshake_fails() {
    test::init_logging();
    let (_peer, endpoint) = silent_peer();

    let mut config = Config::default();
    config.dtls.handshake_timeout = Milliseconds(100);

    let err = UdpDialer::from_config(&config).dial_secure(&endpoint, &test::psk(), &Cancel::new())
                                             .unwrap_err();

    assert!(matches!(err.what, What::HandshakeFailure));
    assert_eq!(err.when, When::Dialing);
  }

  #[test]
  fn cancelled_handshake_gives_up_early() {
    let (_peer, endpoint) = silent_peer();

    let cancel = Cancel::new();
    cancel.cancel();

    let started = std::time::Instant::now();
    let err = UdpDialer::default().dial_secure(&endpoint, &test::psk(), &cancel)
                                  .unwrap_err();

    assert!(matches!(err.what, What::HandshakeFailure));
    assert!(started.elapsed() < Duration::from_secs(3));
  }
}
