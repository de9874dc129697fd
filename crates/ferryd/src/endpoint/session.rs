//! One client session on the daemon bus.

use std::io;
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::time::Duration;

use ferry_bus::{DispatchError, EventBus, PendingRequests, Subscriber, Subscription};
use ferry_config::DaemonDescriptor;
use ferry_messages::{Message, MessageKind, RequestId, decode, encode};
use tracing::{debug, warn};
use tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tungstenite::{Message as Frame, WebSocket};

use super::ENDPOINT_TARGET;
use super::handshake::authorise;
use crate::health::HealthReporter;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Shared by every connection of one endpoint.
pub(super) struct SessionContext {
    pub(super) bus: Arc<EventBus>,
    pub(super) descriptor: Arc<DaemonDescriptor>,
    pub(super) reporter: Arc<dyn HealthReporter>,
    pub(super) shutdown: Arc<AtomicBool>,
}

/// Daemon-bus subscriber delivering one session's traffic.
///
/// Responses are forwarded only when their daemon id was issued by this
/// session; they leave with the client's original id. Events go to every
/// session.
struct SessionSink {
    session: u64,
    pending: PendingRequests<RequestId>,
    outgoing: Sender<String>,
}

impl SessionSink {
    fn forward(&self, message: &Message) -> Result<(), DispatchError> {
        let frame =
            encode(message).map_err(|error| DispatchError::failed("encode outgoing message", error))?;
        if self.outgoing.send(frame).is_err() {
            debug!(target: ENDPOINT_TARGET, session = self.session, "session already closed");
        }
        Ok(())
    }
}

impl Subscriber for SessionSink {
    fn subscription(&self) -> Subscription {
        Subscription::kinds([MessageKind::Response, MessageKind::Event])
    }

    fn on_message(&self, message: &Message) -> Result<(), DispatchError> {
        match message {
            Message::Response(response) => match self.pending.remove(response.request_id) {
                Some(client_id) => self.forward(&response.relabelled(client_id).into()),
                None => Ok(()),
            },
            Message::Event(_) => self.forward(message),
            Message::Request(_) | Message::EventResponse(_) => Ok(()),
        }
    }
}

/// Runs the upgrade and then the session until either side closes.
pub(super) fn handle_connection(stream: TcpStream, session: u64, context: &SessionContext) {
    let mut user = None;
    let callback = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        match authorise(&context.descriptor, request) {
            Ok(name) => {
                user = Some(name);
                Ok(response)
            }
            Err(rejection) => {
                context
                    .reporter
                    .handshake_rejected(rejection.status.as_u16(), rejection.reason);
                Err(rejection.into_response())
            }
        }
    };
    let socket = match tungstenite::accept_hdr(stream, callback) {
        Ok(socket) => socket,
        Err(error) => {
            debug!(target: ENDPOINT_TARGET, session, %error, "WebSocket upgrade failed");
            return;
        }
    };
    let Some(user) = user else {
        return;
    };
    context.reporter.session_opened(session, &user);
    if let Err(error) = run_session(socket, session, context) {
        debug!(target: ENDPOINT_TARGET, session, %error, "session ended with an error");
    }
    context.reporter.session_closed(session);
}

fn run_session(
    mut socket: WebSocket<TcpStream>,
    session: u64,
    context: &SessionContext,
) -> Result<(), tungstenite::Error> {
    socket.get_ref().set_read_timeout(Some(POLL_INTERVAL))?;
    let (outgoing, receiver) = mpsc::channel();
    let sink = Arc::new(SessionSink {
        session,
        pending: PendingRequests::new(),
        outgoing,
    });
    let registered: Arc<dyn Subscriber> = sink.clone();
    context.bus.register(Arc::clone(&registered));

    let result = pump(&mut socket, &sink, &receiver, context);

    context.bus.unregister(&registered);
    if socket.close(None).is_ok()
        && let Err(error) = socket.flush()
    {
        debug!(target: ENDPOINT_TARGET, session, %error, "close frame not delivered");
    }
    result
}

fn pump(
    socket: &mut WebSocket<TcpStream>,
    sink: &SessionSink,
    receiver: &Receiver<String>,
    context: &SessionContext,
) -> Result<(), tungstenite::Error> {
    while !context.shutdown.load(Ordering::SeqCst) {
        while let Ok(frame) = receiver.try_recv() {
            socket.send(Frame::text(frame))?;
        }
        match socket.read() {
            Ok(Frame::Text(text)) => accept_frame(sink, &context.bus, text.as_str()),
            Ok(Frame::Close(_)) => return Ok(()),
            Ok(_) => {}
            Err(tungstenite::Error::Io(error)) if is_poll_timeout(&error) => match socket.flush() {
                Ok(()) => {}
                Err(tungstenite::Error::Io(error)) if is_poll_timeout(&error) => {}
                Err(error) => return Err(error),
            },
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                return Ok(());
            }
            Err(error) => return Err(error),
        }
    }
    Ok(())
}

/// Posts one client frame on the daemon bus.
fn accept_frame(sink: &SessionSink, bus: &EventBus, frame: &str) {
    match decode(frame) {
        Ok(Message::Request(request)) => {
            let relabelled = request.relabelled(RequestId::next());
            sink.pending.put(relabelled.id, request.id);
            debug!(
                target: ENDPOINT_TARGET,
                session = sink.session,
                client_id = %request.id,
                daemon_id = %relabelled.id,
                message_type = %relabelled.body.message_type(),
                "request received"
            );
            bus.post(&relabelled.into());
        }
        Ok(message @ Message::EventResponse(_)) => {
            bus.post(&message);
        }
        Ok(message) => warn!(
            target: ENDPOINT_TARGET,
            session = sink.session,
            message_type = %message.message_type(),
            "clients may only send requests and event responses"
        ),
        Err(error) => warn!(
            target: ENDPOINT_TARGET,
            session = sink.session,
            %error,
            "dropping malformed frame"
        ),
    }
}

fn is_poll_timeout(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}
