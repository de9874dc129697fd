//! Reconnecting transport between the client bus and the daemon.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use camino::Utf8PathBuf;
use ferry_bus::{DispatchError, EventBus, Subscriber, Subscription};
use ferry_config::{DaemonDescriptor, DaemonUser};
use ferry_messages::{Message, MessageKind, Request, decode, encode};
use tracing::{debug, info, warn};

use super::state::{SessionState, StateCell, StopSignal};
use super::websocket::{Connector, Session};
use super::{TRANSPORT_TARGET, TransportError};

const THREAD_NAME: &str = "ferry-ws-client";

/// Forwards requests posted on the client bus into the live session.
///
/// While no session is attached, requests are dropped with a warning.
#[derive(Default)]
struct Outbox {
    sender: Mutex<Option<Sender<String>>>,
}

impl Outbox {
    fn attach(&self) -> Receiver<String> {
        let (sender, receiver) = mpsc::channel();
        *self.sender.lock().unwrap_or_else(PoisonError::into_inner) = Some(sender);
        receiver
    }

    fn detach(&self) {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

impl Subscriber for Outbox {
    fn subscription(&self) -> Subscription {
        Subscription::kinds([MessageKind::Request])
    }

    fn on_message(&self, message: &Message) -> Result<(), DispatchError> {
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = sender.as_ref() else {
            warn!(
                target: TRANSPORT_TARGET,
                message_type = %message.message_type(),
                "not connected to the daemon; dropping request"
            );
            return Ok(());
        };
        let frame = encode(message).map_err(|error| DispatchError::failed("encode request", error))?;
        if sender.send(frame).is_err() {
            warn!(
                target: TRANSPORT_TARGET,
                message_type = %message.message_type(),
                "session ended before the request was sent"
            );
        }
        Ok(())
    }
}

/// Settings that stay fixed for the lifetime of one session thread.
struct SessionContext {
    bus: Arc<EventBus>,
    connector: Arc<dyn Connector>,
    outbox: Arc<Outbox>,
    state: Arc<StateCell>,
    stop: Arc<StopSignal>,
    backoff: Duration,
    descriptor: DaemonDescriptor,
    user: DaemonUser,
}

/// Maintains a WebSocket session with the daemon for one bus.
///
/// Requests posted on the bus are serialised and transmitted while a session
/// is connected. Frames received from the daemon are decoded and posted on the
/// bus. When the session fails the client waits for the backoff and dials
/// again until [`Self::stop`] is called.
pub struct TransportClient {
    bus: Arc<EventBus>,
    connector: Arc<dyn Connector>,
    config_dir: Utf8PathBuf,
    backoff: Duration,
    outbox: Arc<Outbox>,
    state: Arc<StateCell>,
    stop: Arc<StopSignal>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl TransportClient {
    /// Builds a client that reads `daemon.json` from `config_dir`.
    pub fn new(
        bus: Arc<EventBus>,
        connector: Arc<dyn Connector>,
        config_dir: impl Into<Utf8PathBuf>,
        backoff: Duration,
    ) -> Self {
        Self {
            bus,
            connector,
            config_dir: config_dir.into(),
            backoff,
            outbox: Arc::new(Outbox::default()),
            state: Arc::new(StateCell::new()),
            stop: Arc::new(StopSignal::default()),
            thread: Mutex::new(None),
        }
    }

    /// Loads the daemon descriptor and starts the session thread.
    ///
    /// Fails without spawning anything when the descriptor is missing or
    /// lists no users.
    pub fn start(&self) -> Result<(), TransportError> {
        let mut thread = self.thread.lock().unwrap_or_else(PoisonError::into_inner);
        if thread.is_some() {
            return Err(TransportError::AlreadyStarted);
        }
        let descriptor = DaemonDescriptor::load(&self.config_dir)
            .map_err(|source| TransportError::Descriptor { source })?;
        let user = descriptor
            .first_user()
            .map_err(|source| TransportError::Descriptor { source })?
            .clone();

        self.stop.reset();
        let outbox: Arc<dyn Subscriber> = self.outbox.clone();
        self.bus.register(outbox);
        let context = SessionContext {
            bus: Arc::clone(&self.bus),
            connector: Arc::clone(&self.connector),
            outbox: Arc::clone(&self.outbox),
            state: Arc::clone(&self.state),
            stop: Arc::clone(&self.stop),
            backoff: self.backoff,
            descriptor,
            user,
        };
        let handle = thread::Builder::new()
            .name(THREAD_NAME.to_owned())
            .spawn(move || run_session_loop(&context))
            .map_err(|source| TransportError::Spawn { source })?;
        *thread = Some(handle);
        Ok(())
    }

    /// Stops reconnecting, closes the session and joins the thread.
    pub fn stop(&self) -> Result<(), TransportError> {
        self.stop.stop();
        let outbox: Arc<dyn Subscriber> = self.outbox.clone();
        self.bus.unregister(&outbox);
        let handle = self
            .thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match handle {
            Some(handle) => handle.join().map_err(|_| TransportError::ThreadPanic),
            None => Ok(()),
        }
    }

    /// Current session state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state.get()
    }

    /// Blocks until a session is connected or `timeout` elapses.
    #[must_use]
    pub fn wait_until_connected(&self, timeout: Duration) -> bool {
        self.state.wait_for(SessionState::Connected, timeout)
    }
}

impl Drop for TransportClient {
    fn drop(&mut self) {
        if let Err(error) = self.stop() {
            warn!(target: TRANSPORT_TARGET, %error, "transport client did not stop cleanly");
        }
    }
}

fn run_session_loop(context: &SessionContext) {
    info!(
        target: TRANSPORT_TARGET,
        url = %context.descriptor.websocket_url(),
        user = %context.user.username,
        "transport client started"
    );
    while !context.stop.is_stopped() {
        context.state.set(SessionState::Connecting);
        let outcome = context
            .connector
            .connect(&context.descriptor, &context.user)
            .and_then(|session| run_session(context, session));
        match outcome {
            Ok(()) => context.state.set(SessionState::Disconnected),
            Err(error) => {
                context.state.set(SessionState::Error);
                warn!(
                    target: TRANSPORT_TARGET,
                    %error,
                    retry_ms = context.backoff.as_millis(),
                    "daemon session failed"
                );
                context.state.set(SessionState::Disconnected);
            }
        }
        if context.stop.wait(context.backoff) {
            break;
        }
    }
    context.state.set(SessionState::Disconnected);
    info!(target: TRANSPORT_TARGET, "transport client stopped");
}

/// Pumps one session until it fails or the client is stopped.
fn run_session(context: &SessionContext, mut session: Box<dyn Session>) -> Result<(), TransportError> {
    let outgoing = context.outbox.attach();
    context.state.set(SessionState::Connected);
    info!(target: TRANSPORT_TARGET, "connected to daemon");

    let result = pump(context, session.as_mut(), &outgoing);
    context.outbox.detach();
    if context.stop.is_stopped() || result.is_err() {
        session.close();
    }
    result
}

fn pump(
    context: &SessionContext,
    session: &mut dyn Session,
    outgoing: &Receiver<String>,
) -> Result<(), TransportError> {
    let bootstrap = encode(&Message::Request(Request::list_watches()))?;
    if let Err(error) = session.send_text(&bootstrap) {
        warn!(target: TRANSPORT_TARGET, %error, "failed to request the watch list");
    }

    while !context.stop.is_stopped() {
        while let Ok(frame) = outgoing.try_recv() {
            if let Err(error) = session.send_text(&frame) {
                warn!(target: TRANSPORT_TARGET, %error, "failed to send request");
            }
        }
        let Some(frame) = session.read_text()? else {
            continue;
        };
        match decode(&frame) {
            Ok(Message::Request(request)) => warn!(
                target: TRANSPORT_TARGET,
                request_id = %request.id,
                message_type = %request.body.message_type(),
                "dropping request sent by the daemon"
            ),
            Ok(message) => {
                debug!(
                    target: TRANSPORT_TARGET,
                    message_type = %message.message_type(),
                    "received message"
                );
                context.bus.post(&message);
            }
            Err(error) => warn!(
                target: TRANSPORT_TARGET,
                %error,
                "dropping undecodable frame"
            ),
        }
    }
    Ok(())
}
