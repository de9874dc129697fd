//! Error types for the CLI runtime.

use std::io;
use std::sync::Arc;

use thiserror::Error;

use crate::history::HistoryError;
use crate::shell::ShellError;
use crate::transport::TransportError;

#[derive(Debug, Error)]
pub(crate) enum CliError {
    #[error("failed to load configuration: {0}")]
    LoadConfiguration(Arc<ortho_config::OrthoError>),
    #[error("{0}")]
    Usage(clap::Error),
    #[error("invalid log filter: {0}")]
    LogFilter(String),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("could not reach the daemon within {timeout_ms} ms")]
    NotConnected { timeout_ms: u128 },
    #[error("timed out after {timeout_ms} ms waiting for {what}")]
    Timeout { what: &'static str, timeout_ms: u128 },
    #[error(transparent)]
    History(#[from] HistoryError),
    #[error(transparent)]
    Shell(#[from] ShellError),
    #[error("failed to install signal handlers: {source}")]
    Signals {
        #[source]
        source: io::Error,
    },
    #[error("failed to render output: {0}")]
    Render(serde_json::Error),
    #[error("failed to write output: {0}")]
    Write(io::Error),
}
