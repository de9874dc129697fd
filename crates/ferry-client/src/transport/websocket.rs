//! WebSocket sessions with the daemon.

use std::io;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use ferry_config::{DaemonDescriptor, DaemonUser};
use tracing::debug;
use tungstenite::client::IntoClientRequest;
use tungstenite::handshake::{HandshakeError, HandshakeRole};
use tungstenite::http::HeaderValue;
use tungstenite::http::header::{AUTHORIZATION, ORIGIN};
use tungstenite::{Message as Frame, WebSocket};

use super::{TRANSPORT_TARGET, TransportError};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Opens sessions with the daemon.
pub trait Connector: Send + Sync + 'static {
    /// Dials the daemon described by `descriptor`, authenticating as `user`.
    fn connect(
        &self,
        descriptor: &DaemonDescriptor,
        user: &DaemonUser,
    ) -> Result<Box<dyn Session>, TransportError>;
}

/// One established session, owned by the transport thread.
pub trait Session: Send {
    /// Transmits one text frame.
    fn send_text(&mut self, frame: &str) -> Result<(), TransportError>;

    /// Returns the next text frame, or `None` when nothing arrived within the
    /// session's poll interval.
    fn read_text(&mut self) -> Result<Option<String>, TransportError>;

    /// Closes the session; errors are ignored.
    fn close(&mut self);
}

/// Plain `ws://` connector built on `tungstenite`.
#[derive(Debug, Clone, Copy)]
pub struct WebSocketConnector {
    connect_timeout: Duration,
    poll_interval: Duration,
}

impl Default for WebSocketConnector {
    fn default() -> Self {
        Self {
            connect_timeout: CONNECT_TIMEOUT,
            poll_interval: POLL_INTERVAL,
        }
    }
}

impl WebSocketConnector {
    /// Builds a connector with the default timeouts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Connector for WebSocketConnector {
    fn connect(
        &self,
        descriptor: &DaemonDescriptor,
        user: &DaemonUser,
    ) -> Result<Box<dyn Session>, TransportError> {
        let url = descriptor.websocket_url();
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|source| TransportError::Handshake { source })?;
        let headers = request.headers_mut();
        headers.insert(AUTHORIZATION, header_value("authorization", &user.basic_authorization())?);
        headers.insert(ORIGIN, header_value("origin", &descriptor.origin())?);

        let settings = &descriptor.web_server;
        let endpoint = format!("{}:{}", settings.bind_address, settings.bind_port);
        let address = resolve(&settings.bind_address, settings.bind_port, &endpoint)?;
        let stream = TcpStream::connect_timeout(&address, self.connect_timeout).map_err(
            |source| TransportError::Connect {
                endpoint: endpoint.clone(),
                source,
            },
        )?;
        stream
            .set_read_timeout(Some(self.connect_timeout))
            .map_err(|source| TransportError::Connect {
                endpoint: endpoint.clone(),
                source,
            })?;

        let (socket, _) = tungstenite::client(request, stream).map_err(handshake_error)?;
        socket
            .get_ref()
            .set_read_timeout(Some(self.poll_interval))
            .map_err(|source| TransportError::Connect {
                endpoint: endpoint.clone(),
                source,
            })?;
        debug!(target: TRANSPORT_TARGET, %url, user = %user.username, "WebSocket handshake completed");
        Ok(Box::new(WebSocketSession { socket }))
    }
}

fn header_value(name: &'static str, value: &str) -> Result<HeaderValue, TransportError> {
    HeaderValue::from_str(value).map_err(|source| TransportError::Header { name, source })
}

fn resolve(host: &str, port: u16, endpoint: &str) -> Result<SocketAddr, TransportError> {
    (host, port)
        .to_socket_addrs()
        .map_err(|source| TransportError::Resolve {
            endpoint: endpoint.to_owned(),
            source,
        })?
        .next()
        .ok_or_else(|| TransportError::ResolveEmpty {
            endpoint: endpoint.to_owned(),
        })
}

fn handshake_error<R: HandshakeRole>(error: HandshakeError<R>) -> TransportError {
    match error {
        HandshakeError::Failure(tungstenite::Error::Http(response)) => TransportError::Rejected {
            status: response.status().as_u16(),
        },
        HandshakeError::Failure(source) => TransportError::Handshake { source },
        HandshakeError::Interrupted(_) => TransportError::Handshake {
            source: tungstenite::Error::Io(io::Error::from(io::ErrorKind::TimedOut)),
        },
    }
}

struct WebSocketSession {
    socket: WebSocket<TcpStream>,
}

impl Session for WebSocketSession {
    fn send_text(&mut self, frame: &str) -> Result<(), TransportError> {
        self.socket
            .send(Frame::text(frame.to_owned()))
            .map_err(|source| TransportError::Socket { source })
    }

    fn read_text(&mut self) -> Result<Option<String>, TransportError> {
        match self.socket.read() {
            Ok(Frame::Text(text)) => Ok(Some(text.as_str().to_owned())),
            Ok(Frame::Close(_)) => Err(TransportError::Closed),
            Ok(_) => Ok(None),
            Err(tungstenite::Error::Io(error)) if is_poll_timeout(&error) => {
                // Pongs queued by `read` are flushed here.
                match self.socket.flush() {
                    Ok(()) => Ok(None),
                    Err(tungstenite::Error::Io(error)) if is_poll_timeout(&error) => Ok(None),
                    Err(source) => Err(TransportError::Socket { source }),
                }
            }
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                Err(TransportError::Closed)
            }
            Err(source) => Err(TransportError::Socket { source }),
        }
    }

    fn close(&mut self) {
        if self.socket.close(None).is_ok()
            && let Err(error) = self.socket.flush()
        {
            debug!(target: TRANSPORT_TARGET, %error, "close frame not delivered");
        }
    }
}

fn is_poll_timeout(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}
