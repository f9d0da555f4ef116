use std::thread;

use embedded_time::{Clock as _, Instant};

mod error;
#[doc(inline)]
pub use error::*;

use crate::config::Config;
use crate::logging;
use crate::net::{Dial, Link, Psk};
use crate::req::Req;
use crate::resp::{code, Resp};
use crate::retry::{RetryTimer, YouShould};
use crate::session::{SessionCache, SessionKey};
use crate::time::{self, Cancel, Clock, Millis};

/// Largest response we accept (the largest DTLS record plaintext)
pub const MAX_DATAGRAM: usize = 16_384;

/// Executes requests against the gateway.
///
/// Owns the dialer and the cached DTLS session. Shared between
/// the worker threads performing requests, so everything here
/// takes `&self`.
#[derive(Debug)]
pub struct Core<D: Dial> {
  dialer: D,
  config: Config,
  sessions: SessionCache<D::Secure>,
  clock: Clock,
}

impl<D: Dial> Core<D> {
  /// Create a core that opens links with `dialer`
  pub fn new(dialer: D, config: Config) -> Self {
    let idle = time::to_duration(config.dtls.session_idle_lifetime);

    Self { dialer,
           config,
           sessions: SessionCache::new(idle),
           clock: Clock::new() }
  }

  /// Runtime config
  pub fn config(&self) -> &Config {
    &self.config
  }

  /// The cached DTLS session
  pub fn sessions(&self) -> &SessionCache<D::Secure> {
    &self.sessions
  }

  /// Perform one request and map the response code.
  ///
  /// Requests with a [`Psk`] go over the cached DTLS session
  /// and transport failures are retried over a fresh one.
  /// Requests without are sent once over a fresh plaintext socket.
  ///
  /// On success yields the response payload; response codes
  /// that are not success codes become errors carrying the payload.
  pub fn exec(&self, req: &Req, cancel: &Cancel) -> Result<Vec<u8>, Error> {
    let msg = req.message();
    log::trace!("{} {} -> {}",
                logging::msg_summary(&msg),
                req.path,
                req.endpoint);

    let dgram = req.to_bytes()?;

    let resp = match req.psk {
      | Some(ref psk) => self.send_secure(req, psk, &dgram, cancel),
      | None => self.send_plain(req, &dgram, cancel),
    }?;

    log::trace!("{} <- {} ({} byte payload)",
                code::to_human(resp.code),
                req.endpoint,
                resp.payload.len());

    resp.into_result()
  }

  fn now(&self, when: When) -> Result<Instant<Clock>, Error> {
    self.clock.try_now().map_err(|_| when.what(What::ClockError))
  }

  /// Send over the cached session, invalidating and resending
  /// after transport failures until attempts run out.
  fn send_secure(&self, req: &Req, psk: &Psk, dgram: &[u8], cancel: &Cancel) -> Result<Resp, Error> {
    let key = SessionKey::new(&req.endpoint, psk);
    let mut retry = RetryTimer::new(self.now(When::Sending(1))?,
                                    self.config.retry.strategy,
                                    self.config.retry.max_attempts());

    loop {
      let attempt = retry.attempts().0;

      if cancel.is_cancelled() {
        return Err(When::Sending(attempt).what(What::Cancelled));
      }

      let result = {
        let mut sessions = self.sessions.lock();

        // we may have waited on the lock past the caller's deadline
        if cancel.is_cancelled() {
          return Err(When::Sending(attempt).what(What::Cancelled));
        }

        let link = sessions.get_or_create(&key, || {
                             self.dialer.dial_secure(&req.endpoint, psk, cancel)
                           })?;

        let result = self.exchange(link, dgram, attempt, self.config.msg.read_timeout, cancel);

        if result.is_err() {
          sessions.invalidate();
        }

        result
      };

      match result {
        | Ok(bytes) => return Resp::from_bytes(&bytes),
        | Err(e) if e.is_transport() => {
          log::warn!("{}, session dropped", e);
          match self.back_off(&mut retry, cancel)? {
            | YouShould::Retry => continue,
            | YouShould::Cry => return Err(e),
          }
        },
        | Err(e) => return Err(e),
      }
    }
  }

  /// Wait until the retry strategy says to try again
  /// (or that we are out of attempts).
  fn back_off(&self,
              retry: &mut RetryTimer<Clock>,
              cancel: &Cancel)
              -> Result<YouShould, Error> {
    let attempt = retry.attempts().0;

    loop {
      match retry.what_should_i_do(self.now(When::Sending(attempt))?) {
        | Ok(should) => return Ok(should),
        | Err(nb::Error::WouldBlock) => {
          if cancel.is_cancelled() {
            return Err(When::Sending(attempt).what(What::Cancelled));
          }

          thread::sleep(time::to_duration(self.config.msg.poll_interval));
        },
        | Err(nb::Error::Other(never)) => match never {},
      }
    }
  }

  /// One shot over a fresh plaintext socket
  fn send_plain(&self, req: &Req, dgram: &[u8], cancel: &Cancel) -> Result<Resp, Error> {
    if cancel.is_cancelled() {
      return Err(When::Sending(1).what(What::Cancelled));
    }

    let mut link = self.dialer.dial_plain(&req.endpoint)?;
    let result = self.exchange(&mut link,
                               dgram,
                               1,
                               self.config.msg.plain_response_timeout,
                               cancel);
    link.shutdown();

    Resp::from_bytes(&result?)
  }

  /// Write `dgram` and wait up to `timeout` for one datagram back
  fn exchange<L: Link>(&self,
                       link: &mut L,
                       dgram: &[u8],
                       attempt: u16,
                       timeout: Millis,
                       cancel: &Cancel)
                       -> Result<Vec<u8>, Error> {
    link.send(dgram)
        .map_err(|e| When::Sending(attempt).what(What::WriteFailure(e)))?;

    log::trace!("sent {}b (attempt {})", dgram.len(), attempt);

    let when = When::Receiving(attempt);
    let sent_at = self.now(when)?;
    let mut buf = vec![0u8; MAX_DATAGRAM];

    loop {
      if cancel.is_cancelled() {
        return Err(when.what(What::Cancelled));
      }

      match link.poll_recv(&mut buf) {
        | Ok(n) => {
          buf.truncate(n);
          log::trace!("recvd {}b (attempt {})", n, attempt);
          return Ok(buf);
        },
        | Err(nb::Error::WouldBlock) => {
          if time::elapsed(sent_at, self.now(when)?) >= timeout {
            return Err(when.what(What::ReadTimeout));
          }
        },
        | Err(nb::Error::Other(e)) => return Err(when.what(What::ReadFailure(e))),
      }
    }
  }
}
