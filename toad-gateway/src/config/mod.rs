use embedded_time::duration::Milliseconds;

use crate::retry::{Attempts, Strategy};
use crate::time::Millis;

/// The gateway we talk to, and where it is stored
pub mod gateway;

#[doc(inline)]
pub use gateway::{ConfigStore, GatewayConfig};

/// Configuration options related to sending messages & waiting for responses
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Msg {
  /// How long to wait for a response on a DTLS session
  /// before considering the session broken.
  ///
  /// Defaults to 1 second.
  /// ```
  /// use embedded_time::duration::Milliseconds;
  /// use toad_gateway::config::Msg;
  ///
  /// assert_eq!(Msg::default().read_timeout, Milliseconds(1_000u64));
  /// ```
  pub read_timeout: Millis,
  /// How long to wait for a response to a plaintext request.
  ///
  /// Plaintext requests are sent once and never retried.
  ///
  /// Defaults to 2 seconds.
  /// ```
  /// use embedded_time::duration::Milliseconds;
  /// use toad_gateway::config::Msg;
  ///
  /// assert_eq!(Msg::default().plain_response_timeout, Milliseconds(2_000u64));
  /// ```
  pub plain_response_timeout: Millis,
  /// Sockets block for at most this long at a time, so that
  /// cancellation is noticed promptly.
  ///
  /// Defaults to 50 milliseconds.
  /// ```
  /// use embedded_time::duration::Milliseconds;
  /// use toad_gateway::config::Msg;
  ///
  /// assert_eq!(Msg::default().poll_interval, Milliseconds(50u64));
  /// ```
  pub poll_interval: Millis,
}

/// Configuration options related to the DTLS session
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dtls {
  /// Give up on a handshake after this long.
  ///
  /// Defaults to 3 seconds.
  /// ```
  /// use embedded_time::duration::Milliseconds;
  /// use toad_gateway::config::Dtls;
  ///
  /// assert_eq!(Dtls::default().handshake_timeout, Milliseconds(3_000u64));
  /// ```
  pub handshake_timeout: Millis,
  /// A cached session that has not been used for this long
  /// is torn down and a new handshake is performed.
  ///
  /// Defaults to 900 seconds.
  /// ```
  /// use embedded_time::duration::Milliseconds;
  /// use toad_gateway::config::Dtls;
  ///
  /// assert_eq!(Dtls::default().session_idle_lifetime,
  ///            Milliseconds(900_000u64));
  /// ```
  pub session_idle_lifetime: Millis,
  /// OpenSSL cipher list offered during the handshake
  ///
  /// ```
  /// use toad_gateway::config::Dtls;
  ///
  /// assert!(Dtls::default().cipher_list.starts_with("PSK-AES128-CCM8"));
  /// ```
  pub cipher_list: &'static str,
}

/// Configuration options related to resending after transport failures
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Retry {
  /// Number of times a request may be resent (over a fresh session)
  /// after a write or read failure.
  ///
  /// Defaults to 3, so a request is sent at most 4 times.
  /// ```
  /// use toad_gateway::config::Retry;
  /// use toad_gateway::retry::Attempts;
  ///
  /// assert_eq!(Retry::default().max_retries, Attempts(3));
  /// assert_eq!(Retry::default().max_attempts(), Attempts(4));
  /// ```
  pub max_retries: Attempts,
  /// How long to back off between attempts.
  ///
  /// Defaults to resending immediately.
  /// ```
  /// use toad_gateway::config::Retry;
  /// use toad_gateway::retry::Strategy;
  ///
  /// assert_eq!(Retry::default().strategy, Strategy::IMMEDIATE);
  /// ```
  pub strategy: Strategy,
}

impl Retry {
  /// Total number of sends a request may use, the first one included
  pub fn max_attempts(&self) -> Attempts {
    Attempts(self.max_retries.0.saturating_add(1))
  }
}

impl Default for Msg {
  fn default() -> Self {
    Msg { read_timeout: Milliseconds(1_000),
          plain_response_timeout: Milliseconds(2_000),
          poll_interval: Milliseconds(50) }
  }
}

impl Default for Dtls {
  fn default() -> Self {
    Dtls { handshake_timeout: Milliseconds(3_000),
           session_idle_lifetime: Milliseconds(900_000),
           cipher_list: "PSK-AES128-CCM8:PSK-AES128-CBC-SHA256:PSK-AES128-GCM-SHA256" }
  }
}

impl Default for Retry {
  fn default() -> Self {
    Retry { max_retries: Attempts(3),
            strategy: Strategy::IMMEDIATE }
  }
}

/// Runtime config
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config {
  /// See [`Msg`]
  pub msg: Msg,
  /// See [`Dtls`]
  pub dtls: Dtls,
  /// See [`Retry`]
  pub retry: Retry,
  /// Every public request gives up after this long,
  /// and the work it started is cancelled.
  ///
  /// Defaults to 5 seconds.
  /// ```
  /// use embedded_time::duration::Milliseconds;
  /// use toad_gateway::config::Config;
  ///
  /// assert_eq!(Config::default().request_timeout, Milliseconds(5_000u64));
  /// ```
  pub request_timeout: Millis,
}

impl Default for Config {
  fn default() -> Self {
    Config { msg: Msg::default(),
             dtls: Dtls::default(),
             retry: Retry::default(),
             request_timeout: Milliseconds(5_000) }
  }
}

impl Config {
  /// Worst-case time a DTLS request can spend before
  /// the retry loop gives up on its own
  /// (ignoring [`Config::request_timeout`]).
  ///
  /// ```
  /// use embedded_time::duration::Milliseconds;
  /// use toad_gateway::config::Config;
  ///
  /// // 4 x (3s handshake + 1s read)
  /// assert_eq!(Config::default().max_secure_exchange_span(),
  ///            Milliseconds(16_000u64));
  /// ```
  pub fn max_secure_exchange_span(&self) -> Millis {
    let attempts = self.retry.max_attempts().0 as u64;
    let per_attempt = self.dtls.handshake_timeout.0 + self.msg.read_timeout.0;
    let backoff = self.retry.strategy.max_time(self.retry.max_attempts()).0;

    Milliseconds(attempts * per_attempt + backoff)
  }
}
