use std::sync::{PoisonError, RwLock};

use crate::core::{Error, What, When};
use crate::net::{Endpoint, Psk};

/// Default port for plaintext CoAP
pub const COAP_PORT: u16 = 5683;

/// Default port for CoAP over DTLS
pub const COAPS_PORT: u16 = 5684;

/// The gateway device to talk to, and how to authenticate with it.
///
/// The all-empty value (the [`Default`]) means "not configured yet".
///
/// An empty `identity` means requests are sent as plaintext UDP;
/// otherwise they go over DTLS, authenticated with `identity` and `passkey`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct GatewayConfig {
  /// `host` or `host:port` (IPv6 literals as `[addr]:port`)
  pub gateway: String,
  /// DTLS PSK identity
  pub identity: String,
  /// DTLS pre-shared key
  pub passkey: String,
}

impl GatewayConfig {
  /// Is this the zero value?
  pub fn is_unconfigured(&self) -> bool {
    self == &Self::default()
  }

  /// DTLS credentials, if we should be using DTLS at all
  pub fn psk(&self) -> Option<Psk> {
    if self.identity.is_empty() {
      None
    } else {
      Some(Psk { identity: self.identity.clone(),
                 key: self.passkey.clone().into_bytes() })
    }
  }

  /// Parse [`GatewayConfig::gateway`], filling in the
  /// standard CoAP port when none was given.
  ///
  /// ```
  /// use toad_gateway::config::GatewayConfig;
  ///
  /// let cfg = GatewayConfig { gateway: "10.0.0.2".into(),
  ///                           identity: "me".into(),
  ///                           passkey: "key".into() };
  /// let endpoint = cfg.endpoint().unwrap();
  ///
  /// assert_eq!(endpoint.host, "10.0.0.2");
  /// assert_eq!(endpoint.port, 5684);
  /// ```
  pub fn endpoint(&self) -> Result<Endpoint, Error> {
    let default_port = if self.identity.is_empty() {
      COAP_PORT
    } else {
      COAPS_PORT
    };

    Endpoint::parse(&self.gateway, default_port)
  }

  /// Parse a gateway config from a JSON document
  /// (`{"gateway": "...", "identity": "...", "passkey": "..."}`, every key optional)
  #[cfg(feature = "std_serde_json")]
  pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
    serde_json::from_str(json)
  }
}

/// Holds the one gateway config all requests are sent to.
///
/// Writes are up to the surrounding application; requests only ever read it.
#[derive(Debug, Default)]
pub struct ConfigStore(RwLock<GatewayConfig>);

impl ConfigStore {
  /// Create a store holding `config`
  pub fn new(config: GatewayConfig) -> Self {
    Self(RwLock::new(config))
  }

  /// Replace the stored config
  pub fn set_config(&self, config: GatewayConfig) {
    log::debug!("gateway set to {:?}", config.gateway);
    *self.0.write().unwrap_or_else(PoisonError::into_inner) = config;
  }

  /// Get a copy of the stored config.
  ///
  /// Fails with [`What::ConfigMissing`] if it was never set.
  ///
  /// ```
  /// use toad_gateway::config::{ConfigStore, GatewayConfig};
  /// use toad_gateway::core::What;
  ///
  /// let store = ConfigStore::default();
  /// assert!(matches!(store.get_config().unwrap_err().what, What::ConfigMissing));
  ///
  /// store.set_config(GatewayConfig { gateway: "127.0.0.1".into(),
  ///                                  ..Default::default() });
  /// assert_eq!(store.get_config().unwrap().gateway, "127.0.0.1");
  /// ```
  pub fn get_config(&self) -> Result<GatewayConfig, Error> {
    let config = self.0.read().unwrap_or_else(PoisonError::into_inner).clone();

    if config.is_unconfigured() {
      Err(When::Configuring.what(What::ConfigMissing))
    } else {
      Ok(config)
    }
  }
}
