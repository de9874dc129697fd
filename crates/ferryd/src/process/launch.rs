//! Wires bootstrap, the daemon bus and the endpoint together.

use std::sync::Arc;

use ferry_bus::EventBus;
use tracing::info;

use crate::bootstrap::{ConfigLoader, SystemConfigLoader, bootstrap_with};
use crate::endpoint::WebSocketEndpoint;
use crate::health::{HealthReporter, StructuredHealthReporter};
use crate::service::{HistoryBackend, RequestService, UnimplementedBackend};

use super::errors::LaunchError;
use super::shutdown::{ShutdownSignal, SystemShutdownSignal};
use super::PROCESS_TARGET;

const BUS_NAME: &str = "daemon";

/// Collaborators required to run the daemon.
pub struct LaunchPlan<L, S> {
    /// Source of the daemon configuration.
    pub loader: L,
    /// Receives lifecycle events.
    pub reporter: Arc<dyn HealthReporter>,
    /// Decides when to stop.
    pub shutdown: S,
    /// Answers history queries.
    pub backend: Arc<dyn HistoryBackend>,
}

/// Runs the daemon using the production collaborators.
pub fn run_daemon() -> Result<(), LaunchError> {
    run_daemon_with(LaunchPlan {
        loader: SystemConfigLoader,
        reporter: Arc::new(StructuredHealthReporter::new()),
        shutdown: SystemShutdownSignal,
        backend: Arc::new(UnimplementedBackend),
    })
}

/// Runs the daemon with injected collaborators until `shutdown` fires.
pub fn run_daemon_with<L, S>(plan: LaunchPlan<L, S>) -> Result<(), LaunchError>
where
    L: ConfigLoader,
    S: ShutdownSignal,
{
    let LaunchPlan {
        loader,
        reporter,
        shutdown,
        backend,
    } = plan;
    let daemon = bootstrap_with(&loader, reporter.as_ref())?;
    let descriptor = daemon.descriptor().clone();

    let bus = Arc::new(EventBus::new(BUS_NAME));
    let service = Arc::new(RequestService::new(Arc::clone(&bus), &descriptor, backend));
    bus.register(service);

    let endpoint = WebSocketEndpoint::bind(descriptor)?;
    let handle = endpoint.start(Arc::clone(&bus), reporter)?;
    info!(target: PROCESS_TARGET, "daemon ready");

    let waited = shutdown.wait();
    handle.shutdown();
    handle.join()?;
    waited?;
    info!(target: PROCESS_TARGET, "shutdown sequence completed");
    Ok(())
}
