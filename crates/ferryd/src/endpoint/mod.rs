//! WebSocket endpoint serving client sessions.
//!
//! Each accepted connection is validated during the HTTP upgrade (path,
//! `Authorization` and `Origin`) and then served on its own thread. Request
//! ids are only unique per client, so every session relabels incoming
//! requests with daemon-wide ids and maps them back when the responses come
//! by on the daemon bus.

mod errors;
mod handshake;
mod listener;
mod session;

pub use self::errors::ListenerError;
pub use self::listener::{EndpointHandle, WebSocketEndpoint};

const ENDPOINT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::endpoint");
