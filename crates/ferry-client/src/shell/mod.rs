//! Line-protocol endpoint for file manager extensions.
//!
//! Extensions connect over a local socket and exchange newline-terminated
//! lines:
//!
//! - `RETRIEVE_FILE_STATUS:<path>` and `RETRIEVE_FOLDER_STATUS:<path>` ask
//!   the daemon for a file's sync status; the answer is
//!   `STATUS:<status>:<path>`, or `ERR` when the daemon reports a failure.
//! - `REGISTER_PATH:<root>` is pushed to every client for each watched root
//!   whenever a watch list crosses the bus.
//!
//! Any other line is answered with `ERR`.

mod errors;
mod listener;
mod protocol;
mod router;
mod stream;

pub use self::errors::ShellError;
pub use self::listener::ShellListener;
pub use self::router::{ShellHandle, ShellRouter};

const SHELL_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::shell");
