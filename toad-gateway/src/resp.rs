use toad_msg::TryFromBytes;

use crate::core::{Error, What, When};

pub use toad_msg::Code;

/// Response codes
pub mod code {
  use super::Code;

  /// 2.01 Created
  pub const CREATED: Code = Code::new(2, 1);
  /// 2.04 Changed
  pub const CHANGED: Code = Code::new(2, 4);
  /// 2.05 Content
  pub const CONTENT: Code = Code::new(2, 5);
  /// 4.00 Bad Request
  pub const BAD_REQUEST: Code = Code::new(4, 0);
  /// 4.01 Unauthorized
  pub const UNAUTHORIZED: Code = Code::new(4, 1);
  /// 4.04 Not Found
  pub const NOT_FOUND: Code = Code::new(4, 4);
  /// 4.05 Method Not Allowed
  pub const METHOD_NOT_ALLOWED: Code = Code::new(4, 5);

  /// A human name for well-known codes (request methods included)
  pub fn to_human(code: Code) -> &'static str {
    match (code.class, code.detail) {
      | (0, 0) => "Empty",
      | (0, 1) => "GET",
      | (0, 2) => "POST",
      | (0, 3) => "PUT",
      | (2, 1) => "Created",
      | (2, 2) => "Deleted",
      | (2, 3) => "Valid",
      | (2, 4) => "Changed",
      | (2, 5) => "Content",
      | (4, 0) => "Bad Request",
      | (4, 1) => "Unauthorized",
      | (4, 2) => "Bad Option",
      | (4, 3) => "Forbidden",
      | (4, 4) => "Not Found",
      | (4, 5) => "Method Not Allowed",
      | (4, 6) => "Not Acceptable",
      | (5, 0) => "Internal Server Error",
      | (5, 3) => "Service Unavailable",
      | _ => "Unknown",
    }
  }
}

/// Turn a response code into "fine" or the error it stands for.
///
/// | Code | Result |
/// |---|---|
/// | 2.05 Content, 2.04 Changed, 2.01 Created | `Ok(())` |
/// | 4.05 | [`What::MethodNotAllowed`] |
/// | 4.04 | [`What::UriNotFound`] |
/// | 4.00 | [`What::BadRequest`] |
/// | 4.01 | [`What::Unauthorized`] |
/// | anything else | [`What::UnknownError`] |
pub fn check(code: Code) -> Result<(), What> {
  match (code.class, code.detail) {
    | (2, 5) | (2, 4) | (2, 1) => Ok(()),
    | (4, 5) => Err(What::MethodNotAllowed),
    | (4, 4) => Err(What::UriNotFound),
    | (4, 0) => Err(What::BadRequest),
    | (4, 1) => Err(What::Unauthorized),
    | _ => Err(What::UnknownError(code)),
  }
}

/// A response from the gateway
#[derive(Debug, Clone, PartialEq)]
pub struct Resp {
  /// response code
  pub code: Code,
  /// response body (possibly empty)
  pub payload: Vec<u8>,
}

impl Resp {
  /// Parse a response datagram.
  ///
  /// Malformed bytes yield [`What::BadData`].
  pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
    toad_msg::alloc::Message::try_from_bytes(bytes).map(Self::from)
                                                   .map_err(|e| {
                                                     When::Encoding.what(What::BadData(e))
                                                   })
  }

  /// Hand back the payload when the code means success,
  /// otherwise an error carrying the payload.
  pub fn into_result(self) -> Result<Vec<u8>, Error> {
    match check(self.code) {
      | Ok(()) => Ok(self.payload),
      | Err(what) => Err(When::Mapping.what(what).with_payload(self.payload)),
    }
  }
}

impl From<toad_msg::alloc::Message> for Resp {
  fn from(msg: toad_msg::alloc::Message) -> Self {
    Resp { code: msg.code,
           payload: msg.payload.0 }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::test;

  #[test]
  fn success_codes_pass_payload_through() {
    for c in [code::CONTENT, code::CHANGED, code::CREATED] {
      assert!(check(c).is_ok());

      let resp = Resp { code: c,
                        payload: b"12345".to_vec() };
      assert_eq!(resp.into_result().unwrap(), b"12345".to_vec());
    }
  }

  #[test]
  fn known_error_codes_map_exactly() {
    assert!(matches!(check(code::METHOD_NOT_ALLOWED), Err(What::MethodNotAllowed)));
    assert!(matches!(check(code::NOT_FOUND), Err(What::UriNotFound)));
    assert!(matches!(check(code::BAD_REQUEST), Err(What::BadRequest)));
    assert!(matches!(check(code::UNAUTHORIZED), Err(What::Unauthorized)));
  }

  #[test]
  fn everything_else_is_unknown() {
    for c in [Code::new(2, 2), Code::new(2, 3), Code::new(4, 3), Code::new(5, 0), Code::new(0, 0)] {
      assert!(matches!(check(c), Err(What::UnknownError(got)) if got == c));
    }
  }

  #[test]
  fn mapping_is_pure() {
    for _ in 0..3 {
      assert!(matches!(check(code::NOT_FOUND), Err(What::UriNotFound)));
      assert!(check(code::CONTENT).is_ok());
    }
  }

  #[test]
  fn protocol_errors_keep_payload() {
    let resp = Resp { code: code::UNAUTHORIZED,
                      payload: b"who are you".to_vec() };
    let err = resp.into_result().unwrap_err();

    assert!(matches!(err.what, What::Unauthorized));
    assert_eq!(err.when, When::Mapping);
    assert_eq!(err.payload(), Some(&b"who are you"[..]));
  }

  #[test]
  fn parse() {
    let bytes = test::response_bytes(code::CONTENT, b"12345");
    let resp = Resp::from_bytes(&bytes).unwrap();
    assert_eq!(resp,
               Resp { code: code::CONTENT,
                      payload: b"12345".to_vec() });
  }

  #[test]
  fn parse_garbage() {
    let err = Resp::from_bytes(&[0xff]).unwrap_err();
    assert!(matches!(err.what, What::BadData(_)));

    let err = Resp::from_bytes(&[]).unwrap_err();
    assert!(matches!(err.what, What::BadData(_)));
  }

  #[test]
  fn human_codes() {
    assert_eq!(code::to_human(code::CONTENT), "Content");
    assert_eq!(code::to_human(Code::new(1, 1)), "Unknown");
  }
}
