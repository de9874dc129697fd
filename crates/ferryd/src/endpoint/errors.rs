use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Errors raised while binding or running the WebSocket endpoint.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Resolving the bind address failed.
    #[error("failed to resolve {host}:{port}: {source}")]
    Resolve {
        /// Host portion of the bind address.
        host: String,
        /// Port portion of the bind address.
        port: u16,
        /// Resolver error.
        #[source]
        source: io::Error,
    },
    /// The bind address resolved to nothing.
    #[error("no addresses resolved for {host}:{port}")]
    ResolveEmpty {
        /// Host portion of the bind address.
        host: String,
        /// Port portion of the bind address.
        port: u16,
    },
    /// Binding the TCP listener failed.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address being bound.
        addr: SocketAddr,
        /// Socket error.
        #[source]
        source: io::Error,
    },
    /// Switching the listener to non-blocking mode failed.
    #[error("failed to configure listener: {source}")]
    NonBlocking {
        /// Socket error.
        #[source]
        source: io::Error,
    },
    /// The accept thread could not be spawned.
    #[error("failed to spawn the accept thread: {source}")]
    Spawn {
        /// OS error.
        #[source]
        source: io::Error,
    },
    /// The accept thread panicked.
    #[error("endpoint thread panicked")]
    ThreadPanic,
}
