//! The Ferry daemon.
//!
//! `ferryd` loads its configuration and the daemon descriptor, initialises
//! structured telemetry and then serves the WebSocket endpoint described by
//! the descriptor. Every accepted session is bridged onto a daemon-side
//! [`ferry_bus::EventBus`]; requests arriving on it are answered by a
//! [`RequestService`] that lists the watched folders and delegates history
//! queries to a [`HistoryBackend`].
//!
//! The daemon keeps no versioning engine of its own. Without one, history
//! queries are answered with status 501 by [`UnimplementedBackend`].

mod bootstrap;
mod endpoint;
mod health;
mod process;
mod service;
mod telemetry;

pub use bootstrap::{
    BootstrapError, ConfigLoader, Daemon, StaticConfigLoader, SystemConfigLoader, bootstrap_with,
};
pub use endpoint::{EndpointHandle, ListenerError, WebSocketEndpoint};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use process::{
    LaunchError, LaunchPlan, ShutdownError, ShutdownSignal, SystemShutdownSignal, run_daemon,
    run_daemon_with,
};
pub use service::{BackendError, HistoryBackend, RequestService, UnimplementedBackend};
pub use telemetry::{TelemetryError, TelemetryHandle};
