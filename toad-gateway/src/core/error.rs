use std::fmt;
use std::io;

use toad_msg::to_bytes::MessageToBytesError;
use toad_msg::{Code, MessageParseError};

/// The context that an error occurred in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum When {
  /// Reading the gateway config
  Configuring,
  /// Opening a socket or performing a DTLS handshake
  Dialing,
  /// Writing a request (1-based attempt number)
  Sending(u16),
  /// Waiting for a response (1-based attempt number)
  Receiving(u16),
  /// Serializing or parsing a message
  Encoding,
  /// Interpreting the response code
  Mapping,
  /// The caller was waiting on the worker performing the request
  Waiting,
}

impl When {
  /// Construct a specific error from the context the error occurred in
  pub fn what(self, what: What) -> Error {
    Error { what,
            when: self,
            payload: None }
  }
}

/// A contextless error
#[derive(Debug)]
pub enum What {
  /// The gateway config was never set
  ConfigMissing,
  /// The gateway address could not be understood
  InvalidGateway(String),
  /// The DTLS handshake failed or timed out
  /// (this includes the gateway rejecting our identity / key)
  HandshakeFailure,
  /// Opening a plain UDP socket to the gateway failed
  SockError(io::Error),
  /// Writing a request to the network failed
  WriteFailure(io::Error),
  /// No response arrived in time
  ReadTimeout,
  /// Reading a response failed for a reason other than a timeout
  ReadFailure(io::Error),
  /// Serializing the request failed
  ToBytes(MessageToBytesError),
  /// The response could not be parsed as a CoAP message
  BadData(MessageParseError),
  /// 4.05 Method Not Allowed
  MethodNotAllowed,
  /// 4.04 Not Found
  UriNotFound,
  /// 4.00 Bad Request
  BadRequest,
  /// 4.01 Unauthorized
  Unauthorized,
  /// Any response code we do not know what to do with
  UnknownError(Code),
  /// The request did not finish before the deadline
  Timeout,
  /// The request was abandoned by whoever was waiting on it
  Cancelled,
  /// The clock failed to provide timing.
  ///
  /// See [`embedded_time::clock::Error`]
  ClockError,
  /// The worker thread for a request could not be started
  Spawn(io::Error),
}

impl What {
  /// Is this a failure of the network or of the session,
  /// the kind of failure that a resend over a fresh session may fix?
  pub fn is_transport(&self) -> bool {
    matches!(self,
             What::WriteFailure(_) | What::ReadTimeout | What::ReadFailure(_))
  }

  /// Is this the gateway telling us "no" with a response code?
  pub fn is_protocol(&self) -> bool {
    matches!(self,
             What::MethodNotAllowed
             | What::UriNotFound
             | What::BadRequest
             | What::Unauthorized
             | What::UnknownError(_))
  }
}

impl fmt::Display for What {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      | What::ConfigMissing => write!(f, "no gateway config"),
      | What::InvalidGateway(addr) => write!(f, "invalid gateway address {:?}", addr),
      | What::HandshakeFailure => write!(f, "DTLS handshake failed (wrong credentials?)"),
      | What::SockError(e) => write!(f, "socket error: {}", e),
      | What::WriteFailure(e) => write!(f, "write failed: {}", e),
      | What::ReadTimeout => write!(f, "timed out waiting for a response"),
      | What::ReadFailure(e) => write!(f, "read failed: {}", e),
      | What::ToBytes(e) => write!(f, "could not serialize request: {:?}", e),
      | What::BadData(e) => write!(f, "response was not a CoAP message: {:?}", e),
      | What::MethodNotAllowed => write!(f, "method not allowed"),
      | What::UriNotFound => write!(f, "uri not found"),
      | What::BadRequest => write!(f, "bad request"),
      | What::Unauthorized => write!(f, "unauthorized"),
      | What::UnknownError(code) => {
        write!(f, "unexpected response code {}.{:02}", code.class, code.detail)
      },
      | What::Timeout => write!(f, "connection timeout"),
      | What::Cancelled => write!(f, "request cancelled"),
      | What::ClockError => write!(f, "clock error"),
      | What::Spawn(e) => write!(f, "could not start request worker: {}", e),
    }
  }
}

/// An error encountered while performing a request
#[derive(Debug)]
pub struct Error {
  /// What happened?
  pub what: What,
  /// What were we doing when it happened?
  pub when: When,
  /// For response-code errors, the payload that came with the response
  pub payload: Option<Vec<u8>>,
}

impl Error {
  /// Attach a response payload to this error
  pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
    self.payload = Some(payload);
    self
  }

  /// The payload of the response that caused this error, if any
  pub fn payload(&self) -> Option<&[u8]> {
    self.payload.as_deref()
  }

  /// See [`What::is_transport`]
  pub fn is_transport(&self) -> bool {
    self.what.is_transport()
  }

  /// See [`What::is_protocol`]
  pub fn is_protocol(&self) -> bool {
    self.what.is_protocol()
  }
}

impl fmt::Display for Error {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "coap: {}", self.what)?;

    match self.when {
      | When::Sending(n) | When::Receiving(n) => write!(f, " (attempt {})", n),
      | _ => Ok(()),
    }
  }
}

impl std::error::Error for Error {
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
    match self.what {
      | What::SockError(ref e)
      | What::WriteFailure(ref e)
      | What::ReadFailure(ref e)
      | What::Spawn(ref e) => Some(e),
      | _ => None,
    }
  }
}

#[cfg(test)]
mod tests {
  use std::error::Error as _;

  use super::*;

  #[test]
  fn transport_vs_protocol() {
    let broken = || io::Error::from(io::ErrorKind::ConnectionRefused);

    assert!(What::WriteFailure(broken()).is_transport());
    assert!(What::ReadFailure(broken()).is_transport());
    assert!(What::ReadTimeout.is_transport());
    assert!(!What::HandshakeFailure.is_transport());
    assert!(!What::Timeout.is_transport());

    assert!(What::Unauthorized.is_protocol());
    assert!(What::UnknownError(Code::new(5, 0)).is_protocol());
    assert!(!What::ReadTimeout.is_protocol());
  }

  #[test]
  fn display() {
    let e = When::Receiving(2).what(What::ReadTimeout);
    assert_eq!(e.to_string(),
               "coap: timed out waiting for a response (attempt 2)");

    let e = When::Mapping.what(What::UnknownError(Code::new(5, 3)));
    assert_eq!(e.to_string(), "coap: unexpected response code 5.03");
  }

  #[test]
  fn source_is_io_error() {
    let e = When::Sending(1).what(What::WriteFailure(io::Error::from(io::ErrorKind::BrokenPipe)));
    assert!(e.source().is_some());
    assert!(When::Configuring.what(What::ConfigMissing).source().is_none());
  }

  #[test]
  fn payload_rides_along() {
    let e = When::Mapping.what(What::Unauthorized).with_payload(b"nope".to_vec());
    assert_eq!(e.payload(), Some(&b"nope"[..]));
    assert!(When::Configuring.what(What::ConfigMissing).payload().is_none());
  }
}
