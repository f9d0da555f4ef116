use std::collections::BTreeMap;
use std::fmt;

use toad_msg::{Code, Id, OptNumber, OptValue, Payload, Token, TryIntoBytes, Type, Version};

use crate::config::GatewayConfig;
use crate::core::{Error, What, When};
use crate::net::{Endpoint, Psk};

/// Uri-Path option number
/// ([RFC7252 section 5.10.1](https://datatracker.ietf.org/doc/html/rfc7252#section-5.10.1))
pub const URI_PATH: OptNumber = OptNumber(11);

/// Message id stamped on every request
pub const REQUEST_ID: Id = Id(1);

/// Request method
#[derive(Clone, Copy, PartialEq)]
pub struct Method(Code);

impl Method {
  /// GET
  pub const GET: Self = Self(Code::new(0, 1));
  /// POST
  pub const POST: Self = Self(Code::new(0, 2));
  /// PUT
  pub const PUT: Self = Self(Code::new(0, 3));

  /// The request code for this method
  pub fn code(&self) -> Code {
    self.0
  }

  /// Does this method carry a payload?
  pub fn has_payload(&self) -> bool {
    *self != Self::GET
  }
}

impl fmt::Debug for Method {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    fmt::Display::fmt(self, f)
  }
}

impl fmt::Display for Method {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match (self.0.class, self.0.detail) {
      | (0, 1) => write!(f, "GET"),
      | (0, 2) => write!(f, "POST"),
      | (0, 3) => write!(f, "PUT"),
      | (c, d) => write!(f, "{}.{:02}", c, d),
    }
  }
}

/// A request to the gateway.
///
/// Everything needed to perform exactly one exchange; built per call
/// and dropped afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Req {
  /// where to send it
  pub endpoint: Endpoint,
  /// slash-delimited resource path, e.g. `/15001/65540`
  pub path: String,
  /// DTLS credentials; `None` sends plaintext
  pub psk: Option<Psk>,
  /// GET, PUT or POST
  pub method: Method,
  /// body (ignored for GET)
  pub payload: Vec<u8>,
}

impl Req {
  /// Create a request with no payload
  pub fn new(method: Method, endpoint: Endpoint, path: impl AsRef<str>) -> Self {
    Self { endpoint,
           path: path.as_ref().to_string(),
           psk: None,
           method,
           payload: vec![] }
  }

  /// Build a request against the configured gateway
  pub fn for_gateway(method: Method,
                     gateway: &GatewayConfig,
                     path: impl AsRef<str>,
                     payload: impl Into<Vec<u8>>)
                     -> Result<Self, Error> {
    let endpoint = gateway.endpoint()?;
    let mut req = Self::new(method, endpoint, path);
    req.psk = gateway.psk();
    req.set_payload(payload);
    Ok(req)
  }

  /// Create a GET request
  pub fn get(endpoint: Endpoint, path: impl AsRef<str>) -> Self {
    Self::new(Method::GET, endpoint, path)
  }

  /// Create a PUT request
  pub fn put(endpoint: Endpoint, path: impl AsRef<str>, payload: impl Into<Vec<u8>>) -> Self {
    let mut req = Self::new(Method::PUT, endpoint, path);
    req.set_payload(payload);
    req
  }

  /// Create a POST request
  pub fn post(endpoint: Endpoint, path: impl AsRef<str>, payload: impl Into<Vec<u8>>) -> Self {
    let mut req = Self::new(Method::POST, endpoint, path);
    req.set_payload(payload);
    req
  }

  /// Secure this request with DTLS
  pub fn secure(mut self, psk: Psk) -> Self {
    self.psk = Some(psk);
    self
  }

  /// Set the request body
  pub fn set_payload(&mut self, payload: impl Into<Vec<u8>>) {
    self.payload = payload.into();
  }

  /// The same request, as a GET without payload
  pub fn as_get(&self) -> Self {
    Self { method: Method::GET,
           payload: vec![],
           ..self.clone() }
  }

  /// Path segments, in order; empty segments are dropped
  ///
  /// ```
  /// use toad_gateway::net::Endpoint;
  /// use toad_gateway::req::Req;
  ///
  /// let gw = Endpoint { host: "10.0.0.2".into(), port: 5684 };
  /// let req = Req::get(gw, "/15001//65540/");
  ///
  /// assert_eq!(req.path_segments().collect::<Vec<_>>(), vec!["15001", "65540"]);
  /// ```
  pub fn path_segments(&self) -> impl Iterator<Item = &str> {
    self.path.split('/').filter(|seg| !seg.is_empty())
  }

  /// Build the confirmable CoAP message for this request
  pub fn message(&self) -> toad_msg::alloc::Message {
    let segments = self.path_segments()
                       .map(|seg| OptValue(seg.as_bytes().to_vec()))
                       .collect::<Vec<_>>();

    let mut opts = BTreeMap::new();
    if !segments.is_empty() {
      opts.insert(URI_PATH, segments);
    }

    let payload = if self.method.has_payload() {
      self.payload.clone()
    } else {
      vec![]
    };

    toad_msg::alloc::Message { id: REQUEST_ID,
                               ty: Type::Con,
                               ver: Version(1),
                               token: Token(Default::default()),
                               code: self.method.code(),
                               opts,
                               payload: Payload(payload) }
  }

  /// Serialize the message for this request
  pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
    self.message()
        .try_into_bytes::<Vec<u8>>()
        .map_err(|e| When::Encoding.what(What::ToBytes(e)))
  }
}
