//! Errors raised by the shell extension endpoint.

use std::io;

use ferry_config::SocketPreparationError;
use thiserror::Error;

/// Failures binding or serving the shell endpoint.
#[derive(Debug, Error)]
pub enum ShellError {
    /// The Unix socket directory could not be created.
    #[error(transparent)]
    Prepare(#[from] SocketPreparationError),
    /// The endpoint could not be bound.
    #[error("failed to bind shell endpoint {endpoint}: {source}")]
    Bind {
        endpoint: String,
        #[source]
        source: io::Error,
    },
    /// Another process answers on the endpoint's socket file.
    #[error("shell endpoint {endpoint} is served by another process")]
    InUse { endpoint: String },
    #[error("failed to spawn the shell accept thread: {source}")]
    Spawn {
        #[source]
        source: io::Error,
    },
    #[error("shell accept thread panicked")]
    ThreadPanic,
}
