use std::fmt;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;

use crate::config::{Config, ConfigStore, GatewayConfig};
use crate::core::{Core, Error, What, When};
use crate::net::Dial;
use crate::req::{Method, Req};
use crate::session::SessionCache;
use crate::std::UdpDialer;
use crate::time::{self, Cancel};

/// A blocking CoAP client for the configured gateway.
///
/// Every request runs on its own worker thread and is bounded by
/// [`Config::request_timeout`]; when the deadline passes the caller
/// gets [`What::Timeout`] and the worker is told to give up.
///
/// Cloning is cheap, and clones share the DTLS session and the
/// gateway config.
pub struct Client<D: Dial = UdpDialer> {
  core: Arc<Core<D>>,
  gateway: Arc<ConfigStore>,
}

impl<D: Dial> Clone for Client<D> {
  fn clone(&self) -> Self {
    Self { core: self.core.clone(),
           gateway: self.gateway.clone() }
  }
}

impl<D: Dial> fmt::Debug for Client<D> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Client")
     .field("core", &self.core)
     .field("gateway", &self.gateway)
     .finish()
  }
}

impl Client<UdpDialer> {
  /// Create a client talking to `gateway` with the default runtime config
  ///
  /// ```no_run
  /// use toad_gateway::blocking::Client;
  /// use toad_gateway::config::GatewayConfig;
  ///
  /// let client = Client::new(GatewayConfig { gateway: "192.168.1.10".into(),
  ///                                          identity: "my-identity".into(),
  ///                                          passkey: "s3cr3t".into() });
  ///
  /// let echo = client.put("/15001/65540", r#"{"3311":[{"5850":1}]}"#).unwrap();
  /// println!("{}", String::from_utf8_lossy(&echo));
  /// ```
  pub fn new(gateway: GatewayConfig) -> Self {
    Self::new_config(gateway, Config::default())
  }

  /// Create a client with a specific runtime config
  pub fn new_config(gateway: GatewayConfig, config: Config) -> Self {
    Self::with_dialer(UdpDialer::from_config(&config),
                      config,
                      Arc::new(ConfigStore::new(gateway)))
  }
}

impl<D: Dial> Client<D> {
  /// Create a client that opens links with `dialer` and reads
  /// the gateway to talk to from `gateway` on every request
  pub fn with_dialer(dialer: D, config: Config, gateway: Arc<ConfigStore>) -> Self {
    Self { core: Arc::new(Core::new(dialer, config)),
           gateway }
  }

  /// Where the gateway config lives; update it with [`ConfigStore::set_config`]
  pub fn gateway(&self) -> &Arc<ConfigStore> {
    &self.gateway
  }

  /// The cached DTLS session
  pub fn sessions(&self) -> &SessionCache<D::Secure> {
    self.core.sessions()
  }

  /// GET `uri` from the gateway, yielding the response payload
  pub fn get(&self, uri: impl AsRef<str>) -> Result<Vec<u8>, Error> {
    let req = self.req(Method::GET, uri, vec![])?;
    self.guarded(move |core, cancel| core.exec(&req, cancel))
  }

  /// POST `payload` to `uri`, yielding the response payload
  pub fn post(&self, uri: impl AsRef<str>, payload: impl Into<Vec<u8>>) -> Result<Vec<u8>, Error> {
    let req = self.req(Method::POST, uri, payload)?;
    self.guarded(move |core, cancel| core.exec(&req, cancel))
  }

  /// PUT `payload` to `uri`, then GET `uri` and yield what the
  /// gateway now reports.
  ///
  /// Both requests share one deadline. If the PUT fails its error
  /// is returned and no GET is sent.
  pub fn put(&self, uri: impl AsRef<str>, payload: impl Into<Vec<u8>>) -> Result<Vec<u8>, Error> {
    let req = self.req(Method::PUT, uri, payload)?;
    self.guarded(move |core, cancel| {
          core.exec(&req, cancel)?;
          core.exec(&req.as_get(), cancel)
        })
  }

  /// Send a request with explicit endpoint and credentials,
  /// ignoring the stored gateway config.
  pub fn send(&self, req: Req) -> Result<Vec<u8>, Error> {
    self.guarded(move |core, cancel| core.exec(&req, cancel))
  }

  fn req(&self, method: Method, uri: impl AsRef<str>, payload: impl Into<Vec<u8>>) -> Result<Req, Error> {
    let gateway = self.gateway.get_config()?;
    Req::for_gateway(method, &gateway, uri, payload)
  }

  /// Run `work` on a worker thread, waiting at most
  /// [`Config::request_timeout`] for it.
  fn guarded<F>(&self, work: F) -> Result<Vec<u8>, Error>
    where F: FnOnce(&Core<D>, &Cancel) -> Result<Vec<u8>, Error> + Send + 'static
  {
    let (tx, rx) = mpsc::sync_channel(1);
    let cancel = Cancel::new();

    let core = self.core.clone();
    let worker_cancel = cancel.clone();
    thread::Builder::new().name("toad-gateway-request".into())
                          .spawn(move || {
                            // the caller may have stopped listening
                            tx.send(work(&core, &worker_cancel)).ok();
                          })
                          .map_err(|e| When::Waiting.what(What::Spawn(e)))?;

    let limit = self.core.config().request_timeout;
    match rx.recv_timeout(time::to_duration(limit)) {
      | Ok(result) => result,
      | Err(RecvTimeoutError::Timeout) => {
        log::warn!("request did not finish within {:?}, cancelling it",
                   time::to_duration(limit));
        cancel.cancel();
        Err(When::Waiting.what(What::Timeout))
      },
      | Err(RecvTimeoutError::Disconnected) => {
        log::error!("request worker exited without a result");
        Err(When::Waiting.what(What::Timeout))
      },
    }
  }
}

#[cfg(test)]
mod tests {
  use std::time::{Duration, Instant};

  use embedded_time::duration::Milliseconds;

  use super::*;
  use crate::resp::code;
  use crate::test::{self, DialMock, Step};

  fn secure_gateway() -> GatewayConfig {
    GatewayConfig { gateway: "127.0.0.1".into(),
                    identity: "tester".into(),
                    passkey: "secret".into() }
  }

  fn client(mock: &DialMock, gateway: GatewayConfig) -> Client<DialMock> {
    test::init_logging();
    Client::with_dialer(mock.clone(),
                        test::config(),
                        Arc::new(ConfigStore::new(gateway)))
  }

  fn respond(code: crate::resp::Code, payload: &str) -> Step {
    Step::Respond(test::response_bytes(code, payload.as_bytes()))
  }

  fn wait_for(what: impl Fn() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < Duration::from_secs(2) {
      if what() {
        return true;
      }
      thread::sleep(Duration::from_millis(5));
    }
    false
  }

  #[test]
  fn unconfigured_gateway_does_no_io() {
    let mock = DialMock::script([respond(code::CONTENT, "unused")]);
    let client = client(&mock, GatewayConfig::default());

    for result in [client.get("/15001/65540"),
                   client.put("/15001/65540", "on"),
                   client.post("/15011/9063", "{}")]
    {
      assert!(matches!(result.unwrap_err().what, What::ConfigMissing));
    }

    assert_eq!(mock.plain_dials(), 0);
    assert_eq!(mock.secure_dials(), 0);
    assert!(mock.sent().is_empty());
  }

  #[test]
  fn plaintext_get() {
    let mock = DialMock::script([respond(code::CONTENT, "12345")]);
    let client = client(&mock,
                        GatewayConfig { gateway: "127.0.0.1".into(),
                                        ..Default::default() });

    assert_eq!(client.get("/15001/65540").unwrap(), b"12345".to_vec());
    assert_eq!(mock.plain_dials(), 1);
    assert_eq!(mock.secure_dials(), 0);
  }

  #[test]
  fn put_reads_back_the_resource() {
    let mock = DialMock::script([respond(code::CHANGED, ""), respond(code::CONTENT, "on")]);
    let client = client(&mock, secure_gateway());

    assert_eq!(client.put("/15001/65540", "on").unwrap(), b"on".to_vec());

    let sent = mock.sent_msgs();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].code, Method::PUT.code());
    assert_eq!(sent[0].payload.0, b"on".to_vec());
    assert_eq!(sent[1].code, Method::GET.code());
    assert!(sent[1].payload.0.is_empty());

    let raw = mock.sent();
    assert_eq!(test::uri_path(&raw[0]), vec!["15001", "65540"]);
    assert_eq!(test::uri_path(&raw[0]), test::uri_path(&raw[1]));

    assert_eq!(mock.secure_dials(), 1);
  }

  #[test]
  fn failed_put_is_not_read_back() {
    let mock = DialMock::script([respond(code::METHOD_NOT_ALLOWED, ""),
                                 respond(code::CONTENT, "unused")]);
    let client = client(&mock, secure_gateway());

    let err = client.put("/15001", "on").unwrap_err();

    assert!(matches!(err.what, What::MethodNotAllowed));
    assert_eq!(mock.sent().len(), 1);
  }

  #[test]
  fn unauthorized_carries_payload() {
    let mock = DialMock::script([respond(code::UNAUTHORIZED, "bad identity")]);
    let client = client(&mock, secure_gateway());

    let err = client.get("/15001").unwrap_err();

    assert!(matches!(err.what, What::Unauthorized));
    assert_eq!(err.payload(), Some(&b"bad identity"[..]));
    assert_eq!(err.to_string(), "coap: unauthorized");
  }

  #[test]
  fn recovers_from_two_write_failures() {
    let mock = DialMock::script([Step::FailWrite, Step::FailWrite, respond(code::CONTENT, "ok")]);
    let client = client(&mock, secure_gateway());

    assert_eq!(client.get("/15001").unwrap(), b"ok".to_vec());
    assert_eq!(client.sessions().invalidations(), 2);
    assert_eq!(mock.secure_dials(), 3);
  }

  #[test]
  fn post() {
    let mock = DialMock::script([respond(code::CREATED, "")]);
    let client = client(&mock, secure_gateway());

    assert_eq!(client.post("/15011/9063", "{}").unwrap(), Vec::<u8>::new());
    assert_eq!(mock.sent_msgs()[0].code, Method::POST.code());
  }

  #[test]
  fn send_uses_explicit_parameters() {
    let mock = DialMock::script([respond(code::CONTENT, "hi")]);
    let client = client(&mock, GatewayConfig::default());

    let req = Req::get(test::endpoint(), "/a/b").secure(test::psk());
    assert_eq!(client.send(req).unwrap(), b"hi".to_vec());
    assert_eq!(mock.secure_dials(), 1);
  }

  #[test]
  fn deadline_cancels_the_worker() {
    let mock = DialMock::script([Step::Stall]);
    let mut config = test::config();
    config.msg.read_timeout = Milliseconds(10_000);
    config.request_timeout = Milliseconds(50);

    let client = Client::with_dialer(mock.clone(),
                                     config,
                                     Arc::new(ConfigStore::new(secure_gateway())));

    let started = Instant::now();
    let err = client.get("/15001").unwrap_err();

    assert!(matches!(err.what, What::Timeout));
    assert_eq!(err.when, When::Waiting);
    assert!(started.elapsed() < Duration::from_secs(5));

    // the worker notices and tears the session down
    assert!(wait_for(|| client.sessions().invalidations() == 1));
    assert!(wait_for(|| mock.shutdowns() == 1));
    assert!(client.sessions().is_empty());
  }

  #[test]
  fn deadline_aborts_a_hanging_handshake() {
    let mock = DialMock::new().hang_handshake();
    let mut config = test::config();
    config.request_timeout = Milliseconds(50);

    let client = Client::with_dialer(mock.clone(),
                                     config,
                                     Arc::new(ConfigStore::new(secure_gateway())));

    assert!(matches!(client.get("/15001").unwrap_err().what, What::Timeout));
    assert!(client.sessions().is_empty());
    assert_eq!(client.sessions().handshakes(), 0);
  }

  #[test]
  fn clones_share_one_session() {
    let mock = DialMock::script((0..4).map(|n| respond(code::CONTENT, &n.to_string())));
    let client = client(&mock, secure_gateway());

    let threads = (0..4).map(|_| {
                          let client = client.clone();
                          thread::spawn(move || client.get("/15001").unwrap())
                        })
                        .collect::<Vec<_>>();

    let mut got = threads.into_iter()
                         .map(|t| String::from_utf8(t.join().unwrap()).unwrap())
                         .collect::<Vec<_>>();
    got.sort();

    assert_eq!(got, vec!["0", "1", "2", "3"]);
    assert_eq!(client.sessions().handshakes(), 1);
  }

  #[test]
  fn reads_gateway_config_per_request() {
    let mock = DialMock::script([respond(code::CONTENT, "plain"), respond(code::CONTENT, "secure")]);
    let client = client(&mock,
                        GatewayConfig { gateway: "127.0.0.1".into(),
                                        ..Default::default() });

    assert_eq!(client.get("/a").unwrap(), b"plain".to_vec());

    client.gateway().set_config(secure_gateway());
    assert_eq!(client.get("/a").unwrap(), b"secure".to_vec());

    assert_eq!(mock.plain_dials(), 1);
    assert_eq!(mock.secure_dials(), 1);
  }
}
