//! Talk to a gateway from the command line.
//!
//! ```text
//! cargo run --example blocking_client -- <gateway> <identity> <passkey> <path> [payload]
//! ```
//!
//! Pass an empty identity (`""`) to use plaintext CoAP.
//! With a payload the resource is PUT and read back, otherwise it is fetched.

use toad_gateway::blocking::Client;
use toad_gateway::config::GatewayConfig;

fn main() {
  simple_logger::init_with_level(log::Level::Debug).unwrap();

  let args = std::env::args().skip(1).collect::<Vec<_>>();
  let (gateway, identity, passkey, path) = match args.as_slice() {
    | [gateway, identity, passkey, path, ..] => (gateway, identity, passkey, path),
    | _ => {
      eprintln!("usage: blocking_client <gateway> <identity> <passkey> <path> [payload]");
      std::process::exit(2);
    },
  };

  let client = Client::new(GatewayConfig { gateway: gateway.clone(),
                                           identity: identity.clone(),
                                           passkey: passkey.clone() });

  let result = match args.get(4) {
    | Some(payload) => {
      log::info!("PUT {} {}", path, payload);
      client.put(path, payload.as_bytes())
    },
    | None => {
      log::info!("GET {}", path);
      client.get(path)
    },
  };

  match result {
    | Ok(payload) => log::info!("ok! {}", String::from_utf8_lossy(&payload)),
    | Err(e) => {
      let payload = e.payload()
                     .map(|p| String::from_utf8_lossy(p).to_string())
                     .unwrap_or_default();
      log::error!("{} {}", e, payload);
      std::process::exit(1);
    },
  }
}
