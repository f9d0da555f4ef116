use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

use openssl::error::ErrorStack;
use openssl::ssl::{HandshakeError, SslConnector, SslMethod, SslOptions, SslStream, SslVerifyMode};

use super::net::UdpStream;
use crate::core::{Error, What, When};
use crate::net::{io_to_nb, Endpoint, Link, Psk};
use crate::time::Cancel;

/// MTU handed to openssl, which must not query it from our stream
pub const DTLS_MTU: u32 = 1280;

/// A DTLS session with the gateway
#[derive(Debug)]
pub struct DtlsLink(Option<SslStream<UdpStream>>);

impl DtlsLink {
  fn stream(&mut self) -> io::Result<&mut SslStream<UdpStream>> {
    self.0
        .as_mut()
        .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))
  }
}

impl Link for DtlsLink {
  fn send(&mut self, dgram: &[u8]) -> io::Result<()> {
    self.stream()?.write_all(dgram)
  }

  fn poll_recv(&mut self, buf: &mut [u8]) -> nb::Result<usize, io::Error> {
    match self.stream().and_then(|stream| stream.read(buf)) {
      // close_notify from the gateway
      | Ok(0) => Err(nb::Error::Other(io::Error::from(io::ErrorKind::ConnectionAborted))),
      | Ok(n) => Ok(n),
      | Err(e) => Err(io_to_nb(e)),
    }
  }

  fn shutdown(&mut self) {
    if let Some(mut stream) = self.0.take() {
      stream.shutdown().ok();
    }
  }
}

fn connector(psk: &Psk, cipher_list: &str) -> Result<SslConnector, ErrorStack> {
  let mut conn = SslConnector::builder(SslMethod::dtls())?;

  // PSK only, there is no certificate to check
  conn.set_verify(SslVerifyMode::NONE);
  let opts = conn.options();
  conn.set_options(opts | SslOptions::NO_QUERY_MTU);
  conn.set_cipher_list(cipher_list)?;

  let identity = psk.identity.clone().into_bytes();
  let key = psk.key.clone();
  conn.set_psk_client_callback(move |_, _hint, identity_out, key_out| {
        // identity is a C string
        if identity.len() >= identity_out.len() || key.len() > key_out.len() {
          return Err(ErrorStack::get());
        }

        identity_out[..identity.len()].copy_from_slice(&identity);
        identity_out[identity.len()] = 0;
        key_out[..key.len()].copy_from_slice(&key);

        Ok(key.len())
      });

  Ok(conn.build())
}

/// Perform a DTLS handshake over `stream`, authenticating with `psk`.
///
/// Gives up with [`What::HandshakeFailure`] once `timeout` has passed,
/// when `cancel` fires, or when the gateway rejects us.
pub fn handshake(stream: UdpStream,
                 endpoint: &Endpoint,
                 psk: &Psk,
                 cipher_list: &str,
                 timeout: Duration,
                 cancel: &Cancel)
                 -> Result<DtlsLink, Error> {
  let failed = || When::Dialing.what(What::HandshakeFailure);
  let started = Instant::now();

  let mut config = connector(psk, cipher_list).and_then(|conn| conn.configure())
                                              .map_err(|e| {
                                                log::error!("could not set up DTLS: {}", e);
                                                failed()
                                              })?;

  config.set_mtu(DTLS_MTU).map_err(|e| {
                             log::error!("could not set DTLS MTU: {}", e);
                             failed()
                           })?;

  let mut attempt = config.use_server_name_indication(false)
                          .verify_hostname(false)
                          .connect(&endpoint.host, stream);

  loop {
    match attempt {
      | Ok(stream) => {
        log::debug!("DTLS handshake with {} took {:?}",
                    endpoint,
                    started.elapsed());
        return Ok(DtlsLink(Some(stream)));
      },
      | Err(HandshakeError::WouldBlock(mid)) => {
        if cancel.is_cancelled() {
          log::debug!("DTLS handshake with {} cancelled", endpoint);
          return Err(failed());
        }

        if started.elapsed() >= timeout {
          log::warn!("DTLS handshake with {} timed out after {:?}",
                     endpoint,
                     timeout);
          return Err(failed());
        }

        attempt = mid.handshake();
      },
      | Err(e) => {
        log::warn!("DTLS handshake with {} failed: {}", endpoint, e);
        return Err(failed());
      },
    }
  }
}
