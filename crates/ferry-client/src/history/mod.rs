//! Client-side reassembly of listing and change-log queries.
//!
//! Each controller is a bus [`Subscriber`](ferry_bus::Subscriber) that posts
//! requests on the client bus, remembers them in its own
//! [`PendingRequests`](ferry_bus::PendingRequests) and folds the matching
//! responses into local state. Responses whose id is no longer pending are
//! ignored, which is how superseded requests are cancelled.

mod detail;
mod errors;
mod log;
mod roots;
mod tree;

pub use self::detail::DetailController;
pub use self::errors::HistoryError;
pub use self::log::LogController;
pub use self::roots::RootSelector;
pub use self::tree::{TreeController, TreeNode};

const HISTORY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::history");
