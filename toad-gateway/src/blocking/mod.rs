/// Client that blocks the calling thread until the response
/// arrives or the deadline passes
pub mod client;

#[doc(inline)]
pub use client::Client;
