//! `toad-gateway` is a small, blocking CoAP client for talking to
//! a single gateway device (think smart-home hubs) that may sit behind
//! DTLS with a pre-shared key.
//!
//! ## What it does
//! - Sends confirmable GET / PUT / POST requests to the configured gateway
//! - Keeps one DTLS session alive between requests so that not every
//!   request pays for a handshake
//! - When the session breaks (a write fails, a response never arrives),
//!   tears it down, handshakes again and resends; a bounded number of times
//! - Turns CoAP response codes into typed errors
//! - Bounds every call with a deadline, and actually aborts the in-flight
//!   work when the deadline passes
//!
//! ## Plaintext vs DTLS
//! If the [`GatewayConfig`](crate::config::GatewayConfig) has an identity,
//! requests go over DTLS (PSK) with session caching and retries.
//! Without one, each request opens a fresh UDP socket, sends once and reads once.
//!
//! ```no_run
//! use toad_gateway::blocking::Client;
//! use toad_gateway::config::GatewayConfig;
//!
//! let client = Client::new(GatewayConfig { gateway: "192.168.1.10".into(),
//!                                          identity: "my-identity".into(),
//!                                          passkey: "s3cr3t".into() });
//!
//! let bulb = client.get("/15001/65540").unwrap();
//! println!("{}", String::from_utf8_lossy(&bulb));
//! ```

// -
// style
#![allow(clippy::unused_unit)]
// -
// deny
#![deny(missing_debug_implementations)]
#![cfg_attr(not(test), deny(unsafe_code))]
// -
// warnings
#![warn(missing_docs)]
#![warn(missing_copy_implementations)]
#![cfg_attr(not(test), warn(unreachable_pub))]


pub(crate) mod logging;

/// Blocking CoAP gateway client
pub mod blocking;

/// bounded retrying of transport failures
pub mod retry;

/// responses & response code mapping
pub mod resp;

/// requests
pub mod req;

/// request execution, retry loop & errors
pub mod core;

/// the cached DTLS session
pub mod session;

/// network abstractions
pub mod net;

/// time abstractions & cancellation
pub mod time;

/// configuring runtime behavior and the gateway to talk to
pub mod config;

/// `std` sockets & openssl-backed DTLS
pub mod std;
