//! Error types for the WebSocket transport.

use std::io;

use ferry_config::DescriptorError;
use ferry_messages::SerializationError;
use thiserror::Error;
use tungstenite::http::header::InvalidHeaderValue;

/// Errors surfaced while starting or running the transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The daemon descriptor is missing, unreadable or has no users.
    #[error("cannot locate the daemon: {source}")]
    Descriptor {
        /// Underlying descriptor error.
        #[source]
        source: DescriptorError,
    },
    /// The daemon address did not resolve.
    #[error("failed to resolve daemon address {endpoint}: {source}")]
    Resolve {
        /// `host:port` being resolved.
        endpoint: String,
        /// Resolver error.
        #[source]
        source: io::Error,
    },
    /// The daemon address resolved to nothing.
    #[error("no addresses resolved for daemon endpoint {endpoint}")]
    ResolveEmpty {
        /// `host:port` being resolved.
        endpoint: String,
    },
    /// The TCP connection could not be established.
    #[error("failed to connect to daemon at {endpoint}: {source}")]
    Connect {
        /// `host:port` being dialled.
        endpoint: String,
        /// Socket error.
        #[source]
        source: io::Error,
    },
    /// A handshake header could not be encoded.
    #[error("invalid {name} header: {source}")]
    Header {
        /// Header name.
        name: &'static str,
        /// Encoding error.
        #[source]
        source: InvalidHeaderValue,
    },
    /// The daemon answered the handshake with an HTTP error.
    #[error("daemon rejected the connection with HTTP status {status}")]
    Rejected {
        /// HTTP status code, 401 for bad credentials and 403 for a bad origin.
        status: u16,
    },
    /// The WebSocket handshake failed.
    #[error("WebSocket handshake failed: {source}")]
    Handshake {
        /// Protocol error.
        #[source]
        source: tungstenite::Error,
    },
    /// Reading or writing a frame failed.
    #[error("WebSocket session failed: {source}")]
    Socket {
        /// Protocol or IO error.
        #[source]
        source: tungstenite::Error,
    },
    /// The daemon closed the session.
    #[error("daemon closed the session")]
    Closed,
    /// A message could not be serialised.
    #[error(transparent)]
    Encode(#[from] SerializationError),
    /// The session thread could not be spawned.
    #[error("failed to spawn the transport thread: {source}")]
    Spawn {
        /// OS error.
        #[source]
        source: io::Error,
    },
    /// The transport is already running.
    #[error("transport client is already running")]
    AlreadyStarted,
    /// The session thread panicked.
    #[error("transport thread panicked")]
    ThreadPanic,
}
