//! WebSocket transport between a client bus and the daemon.
//!
//! [`TransportClient`] owns one session thread that dials the daemon, pumps
//! frames in both directions and dials again after a fixed backoff when the
//! session fails. Dialling is behind the [`Connector`] seam so tests can run
//! the state machine without sockets.

mod client;
mod errors;
mod state;
mod websocket;

pub use self::client::TransportClient;
pub use self::errors::TransportError;
pub use self::state::SessionState;
pub use self::websocket::{Connector, Session, WebSocketConnector};

const TRANSPORT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");
