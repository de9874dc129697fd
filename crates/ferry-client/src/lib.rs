//! Client side of the Ferry daemon protocol.
//!
//! [`transport`] keeps a WebSocket session with the daemon and relays
//! messages to and from a client [`EventBus`](ferry_bus::EventBus).
//! [`history`] rebuilds folder trees and change logs from the daemon's
//! answers, [`recent`] tracks recently synchronised files and [`shell`]
//! serves file manager extensions. [`run`] is the `ferry` binary's entry
//! point.

mod cli;
pub mod history;
pub mod recent;
pub mod shell;
pub mod transport;

pub use cli::run;
