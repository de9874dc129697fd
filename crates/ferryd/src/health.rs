//! Structured health reporting for daemon lifecycle events.

use std::sync::Arc;

use ferry_config::{Config, DaemonDescriptor};

use crate::bootstrap::BootstrapError;

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Observer trait used to surface lifecycle events to telemetry sinks.
pub trait HealthReporter: Send + Sync {
    /// Invoked before configuration loading begins.
    fn bootstrap_starting(&self);

    /// Invoked after bootstrap completes successfully.
    fn bootstrap_succeeded(&self, config: &Config, descriptor: &DaemonDescriptor);

    /// Invoked when bootstrap fails.
    fn bootstrap_failed(&self, error: &BootstrapError);

    /// Invoked when a client session passes the handshake.
    fn session_opened(&self, session: u64, user: &str);

    /// Invoked when a client session ends.
    fn session_closed(&self, session: u64);

    /// Invoked when a handshake is refused with an HTTP status.
    fn handshake_rejected(&self, status: u16, reason: &str);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter,
{
    fn bootstrap_starting(&self) {
        (**self).bootstrap_starting();
    }

    fn bootstrap_succeeded(&self, config: &Config, descriptor: &DaemonDescriptor) {
        (**self).bootstrap_succeeded(config, descriptor);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        (**self).bootstrap_failed(error);
    }

    fn session_opened(&self, session: u64, user: &str) {
        (**self).session_opened(session, user);
    }

    fn session_closed(&self, session: u64) {
        (**self).session_closed(session);
    }

    fn handshake_rejected(&self, status: u16, reason: &str) {
        (**self).handshake_rejected(status, reason);
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn bootstrap_starting(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_starting",
            "starting daemon bootstrap"
        );
    }

    fn bootstrap_succeeded(&self, config: &Config, descriptor: &DaemonDescriptor) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_succeeded",
            endpoint = %descriptor.websocket_url(),
            watches = descriptor.enabled_folders().count(),
            log_filter = %config.log_filter(),
            log_format = ?config.log_format(),
            "daemon bootstrap completed"
        );
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "bootstrap_failed",
            error = %error,
            "daemon bootstrap failed"
        );
    }

    fn session_opened(&self, session: u64, user: &str) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "session_opened",
            session,
            user,
            "client session opened"
        );
    }

    fn session_closed(&self, session: u64) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "session_closed",
            session,
            "client session closed"
        );
    }

    fn handshake_rejected(&self, status: u16, reason: &str) {
        tracing::warn!(
            target: HEALTH_TARGET,
            event = "handshake_rejected",
            status,
            reason,
            "client handshake rejected"
        );
    }
}
