//! Errors raised by the history controllers.

use camino::Utf8PathBuf;
use thiserror::Error;

/// Misuse of a history controller.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HistoryError {
    /// The operation needs a selected root.
    #[error("no watched root is selected")]
    NoRootSelected,
    /// The root is not among the daemon's watches.
    #[error("'{root}' is not a watched root")]
    UnknownRoot {
        /// Root that was asked for.
        root: Utf8PathBuf,
    },
}
