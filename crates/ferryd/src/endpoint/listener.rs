//! Accept loop of the WebSocket endpoint.

use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use ferry_bus::EventBus;
use ferry_config::DaemonDescriptor;
use tracing::{info, warn};

use super::session::{SessionContext, handle_connection};
use super::{ENDPOINT_TARGET, ListenerError};
use crate::health::HealthReporter;

const ACCEPT_BACKOFF: Duration = Duration::from_millis(25);
const ERROR_BACKOFF: Duration = Duration::from_millis(150);
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);
const THREAD_NAME: &str = "ferryd-endpoint";

/// TCP listener bound to the descriptor's web server address.
#[derive(Debug)]
pub struct WebSocketEndpoint {
    listener: TcpListener,
    descriptor: Arc<DaemonDescriptor>,
}

impl WebSocketEndpoint {
    /// Binds `bindAddress:bindPort` from `descriptor`.
    pub fn bind(descriptor: DaemonDescriptor) -> Result<Self, ListenerError> {
        let host = descriptor.web_server.bind_address.clone();
        let port = descriptor.web_server.bind_port;
        let addr = (host.as_str(), port)
            .to_socket_addrs()
            .map_err(|source| ListenerError::Resolve {
                host: host.clone(),
                port,
                source,
            })?
            .next()
            .ok_or_else(|| ListenerError::ResolveEmpty {
                host: host.clone(),
                port,
            })?;
        let listener =
            TcpListener::bind(addr).map_err(|source| ListenerError::Bind { addr, source })?;
        Ok(Self {
            listener,
            descriptor: Arc::new(descriptor),
        })
    }

    /// Bound address; differs from the descriptor when port 0 was requested.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.local_addr().ok()
    }

    /// Starts accepting sessions that exchange messages with `bus`.
    pub fn start(
        self,
        bus: Arc<EventBus>,
        reporter: Arc<dyn HealthReporter>,
    ) -> Result<EndpointHandle, ListenerError> {
        self.listener
            .set_nonblocking(true)
            .map_err(|source| ListenerError::NonBlocking { source })?;
        let shutdown = Arc::new(AtomicBool::new(false));
        let context = Arc::new(SessionContext {
            bus,
            descriptor: Arc::clone(&self.descriptor),
            reporter,
            shutdown: Arc::clone(&shutdown),
        });
        let handle = thread::Builder::new()
            .name(THREAD_NAME.to_owned())
            .spawn(move || run_accept_loop(&self, &context))
            .map_err(|source| ListenerError::Spawn { source })?;
        Ok(EndpointHandle {
            shutdown,
            handle: Some(handle),
        })
    }
}

/// Handle to the background accept loop.
pub struct EndpointHandle {
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl EndpointHandle {
    /// Asks the accept loop and every session to exit.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Waits for the accept loop and every session it started to exit.
    pub fn join(mut self) -> Result<(), ListenerError> {
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| ListenerError::ThreadPanic),
            None => Ok(()),
        }
    }
}

impl Drop for EndpointHandle {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

fn run_accept_loop(endpoint: &WebSocketEndpoint, context: &Arc<SessionContext>) {
    info!(
        target: ENDPOINT_TARGET,
        url = %endpoint.descriptor.websocket_url(),
        "WebSocket endpoint active"
    );
    let next_session = AtomicU64::new(1);
    let mut sessions: Vec<JoinHandle<()>> = Vec::new();
    let mut last_error = None::<io::ErrorKind>;
    while !context.shutdown.load(Ordering::SeqCst) {
        sessions.retain(|session| !session.is_finished());
        match accept_connection(&endpoint.listener) {
            Ok(Some(stream)) => {
                last_error = None;
                let session = next_session.fetch_add(1, Ordering::Relaxed);
                let context = Arc::clone(context);
                sessions.push(thread::spawn(move || {
                    handle_connection(stream, session, &context);
                }));
            }
            Ok(None) => thread::sleep(ACCEPT_BACKOFF),
            Err(error) => {
                let kind = error.kind();
                if last_error != Some(kind) {
                    warn!(target: ENDPOINT_TARGET, error = %error, "endpoint accept error");
                }
                last_error = Some(kind);
                thread::sleep(ERROR_BACKOFF);
            }
        }
    }
    for session in sessions {
        if session.join().is_err() {
            warn!(target: ENDPOINT_TARGET, "session thread panicked");
        }
    }
    info!(target: ENDPOINT_TARGET, "WebSocket endpoint stopped");
}

fn accept_connection(listener: &TcpListener) -> Result<Option<TcpStream>, io::Error> {
    match listener.accept() {
        Ok((stream, _)) => {
            stream.set_nonblocking(false)?;
            stream.set_read_timeout(Some(HANDSHAKE_TIMEOUT))?;
            Ok(Some(stream))
        }
        Err(error) if error.kind() == io::ErrorKind::WouldBlock => Ok(None),
        Err(error) => Err(error),
    }
}
