//! Behaviour of the WebSocket endpoint against real client sockets.

use std::cell::RefCell;
use std::io;
use std::net::{SocketAddr, TcpStream};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ferry_bus::EventBus;
use ferry_config::{Config, DaemonDescriptor, DaemonUser, WatchedFolder, WebServerSettings};
use ferry_messages::model::LogOptions;
use ferry_messages::{
    Event, Message, Request, RequestId, Response, ResponseBody, decode, encode,
};
use ferryd::{
    BootstrapError, EndpointHandle, HealthReporter, RequestService, UnimplementedBackend,
    WebSocketEndpoint,
};
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use tungstenite::client::IntoClientRequest;
use tungstenite::handshake::HandshakeError;
use tungstenite::http::HeaderValue;
use tungstenite::http::header::{AUTHORIZATION, ORIGIN};
use tungstenite::{Message as Frame, WebSocket};

const USER: &str = "gui";
const PASSWORD: &str = "secret";
const READ_TIMEOUT: Duration = Duration::from_secs(2);
const QUIET_PERIOD: Duration = Duration::from_millis(300);

/// Records refused handshakes and session lifetimes.
#[derive(Default)]
struct RecordingReporter {
    rejections: Mutex<Vec<u16>>,
    opened: Mutex<Vec<u64>>,
    closed: Mutex<Vec<u64>>,
}

impl HealthReporter for RecordingReporter {
    fn bootstrap_starting(&self) {}

    fn bootstrap_succeeded(&self, _config: &Config, _descriptor: &DaemonDescriptor) {}

    fn bootstrap_failed(&self, _error: &BootstrapError) {}

    fn session_opened(&self, session: u64, _user: &str) {
        self.opened.lock().expect("opened lock").push(session);
    }

    fn session_closed(&self, session: u64) {
        self.closed.lock().expect("closed lock").push(session);
    }

    fn handshake_rejected(&self, status: u16, _reason: &str) {
        self.rejections.lock().expect("rejections lock").push(status);
    }
}

struct Upgrade<'a> {
    path: &'a str,
    password: &'a str,
    origin: Option<&'a str>,
}

impl Default for Upgrade<'_> {
    fn default() -> Self {
        Self {
            path: "/api/ws",
            password: PASSWORD,
            origin: None,
        }
    }
}

struct EndpointWorld {
    bus: Arc<EventBus>,
    reporter: Arc<RecordingReporter>,
    handle: Option<EndpointHandle>,
    addr: Option<SocketAddr>,
    clients: Vec<WebSocket<TcpStream>>,
    refusal: Option<u16>,
}

impl EndpointWorld {
    fn new() -> Self {
        Self {
            bus: Arc::new(EventBus::new("daemon")),
            reporter: Arc::new(RecordingReporter::default()),
            handle: None,
            addr: None,
            clients: Vec::new(),
            refusal: None,
        }
    }

    fn start(&mut self, root: &str) {
        let descriptor = DaemonDescriptor {
            web_server: WebServerSettings {
                bind_address: "127.0.0.1".to_owned(),
                bind_port: 0,
            },
            users: vec![DaemonUser::new(USER, PASSWORD)],
            port_user: None,
            folders: vec![WatchedFolder {
                path: root.into(),
                enabled: true,
            }],
        };
        let service = RequestService::new(
            Arc::clone(&self.bus),
            &descriptor,
            Arc::new(UnimplementedBackend),
        );
        self.bus.register(Arc::new(service));
        let endpoint = WebSocketEndpoint::bind(descriptor).expect("bind endpoint");
        self.addr = endpoint.local_addr();
        let reporter: Arc<dyn HealthReporter> = self.reporter.clone();
        self.handle = Some(
            endpoint
                .start(Arc::clone(&self.bus), reporter)
                .expect("start endpoint"),
        );
    }

    fn connect(&self, upgrade: &Upgrade<'_>) -> Result<WebSocket<TcpStream>, u16> {
        let addr = self.addr.expect("endpoint started");
        let mut request = format!("ws://{addr}{}", upgrade.path)
            .into_client_request()
            .expect("client request");
        let authorization = DaemonUser::new(USER, upgrade.password).basic_authorization();
        let headers = request.headers_mut();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&authorization).expect("authorization header"),
        );
        if let Some(origin) = upgrade.origin {
            headers.insert(ORIGIN, HeaderValue::from_str(origin).expect("origin header"));
        }
        let stream = TcpStream::connect(addr).expect("connect to endpoint");
        stream
            .set_read_timeout(Some(READ_TIMEOUT))
            .expect("read timeout");
        match tungstenite::client(request, stream) {
            Ok((socket, _)) => Ok(socket),
            Err(HandshakeError::Failure(tungstenite::Error::Http(response))) => {
                Err(response.status().as_u16())
            }
            Err(error) => panic!("handshake failed: {error}"),
        }
    }

    fn first_client(&mut self) -> &mut WebSocket<TcpStream> {
        self.clients.first_mut().expect("a connected client")
    }
}

impl Drop for EndpointWorld {
    fn drop(&mut self) {
        for client in &mut self.clients {
            if client.close(None).is_ok() {
                drop(client.flush());
            }
        }
        if let Some(handle) = self.handle.take() {
            handle.shutdown();
            drop(handle.join());
        }
    }
}

fn send(socket: &mut WebSocket<TcpStream>, message: &Message) {
    let frame = encode(message).expect("encode message");
    socket.send(Frame::text(frame)).expect("send frame");
}

fn receive(socket: &mut WebSocket<TcpStream>) -> Message {
    loop {
        match socket.read().expect("read frame") {
            Frame::Text(text) => return decode(text.as_str()).expect("decode frame"),
            Frame::Close(_) => panic!("session closed unexpectedly"),
            _ => {}
        }
    }
}

fn assert_quiet(socket: &mut WebSocket<TcpStream>) {
    socket
        .get_ref()
        .set_read_timeout(Some(QUIET_PERIOD))
        .expect("quiet timeout");
    match socket.read() {
        Err(tungstenite::Error::Io(error))
            if matches!(
                error.kind(),
                io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
            ) => {}
        other => panic!("expected no further frames, got {other:?}"),
    }
    socket
        .get_ref()
        .set_read_timeout(Some(READ_TIMEOUT))
        .expect("read timeout");
}

fn list_watches(id: u64) -> Message {
    Request::list_watches().relabelled(RequestId::new(id)).into()
}

#[fixture]
fn world() -> RefCell<EndpointWorld> {
    RefCell::new(EndpointWorld::new())
}

#[given("a daemon watching {root}")]
fn given_daemon(world: &RefCell<EndpointWorld>, root: String) {
    world.borrow_mut().start(&root);
}

#[given("{count} connected clients")]
fn given_clients(world: &RefCell<EndpointWorld>, count: usize) {
    let mut world = world.borrow_mut();
    for _ in 0..count {
        let mut socket = world
            .connect(&Upgrade::default())
            .expect("upgrade accepted");
        // One round trip proves the session is subscribed on the bus.
        send(&mut socket, &list_watches(1));
        assert!(matches!(receive(&mut socket), Message::Response(_)));
        world.clients.push(socket);
    }
}

#[when("a client connects as {user} with password {password}")]
fn when_connect_as(world: &RefCell<EndpointWorld>, user: String, password: String) {
    assert_eq!(user, USER);
    let mut world = world.borrow_mut();
    let outcome = world.connect(&Upgrade {
        password: &password,
        ..Upgrade::default()
    });
    world.refusal = outcome.err();
}

#[when("a client connects from origin {origin}")]
fn when_connect_from(world: &RefCell<EndpointWorld>, origin: String) {
    let mut world = world.borrow_mut();
    let outcome = world.connect(&Upgrade {
        origin: Some(&origin),
        ..Upgrade::default()
    });
    world.refusal = outcome.err();
}

#[when("a client connects on path {path}")]
fn when_connect_on(world: &RefCell<EndpointWorld>, path: String) {
    let mut world = world.borrow_mut();
    let outcome = world.connect(&Upgrade {
        path: &path,
        ..Upgrade::default()
    });
    world.refusal = outcome.err();
}

#[when("every client lists the watches with request id {id}")]
fn when_every_client_lists(world: &RefCell<EndpointWorld>, id: u64) {
    for socket in &mut world.borrow_mut().clients {
        send(socket, &list_watches(id));
    }
}

#[when("the daemon announces a sync start for {root}")]
fn when_sync_start(world: &RefCell<EndpointWorld>, root: String) {
    let world = world.borrow();
    world.bus.post(&Event::WatchStartSync { root: root.into() }.into());
}

#[when("the endpoint is stopped")]
fn when_stopped(world: &RefCell<EndpointWorld>) {
    let handle = world.borrow_mut().handle.take().expect("endpoint started");
    handle.shutdown();
    handle.join().expect("join endpoint");
}

#[when("the first client sends a malformed frame")]
fn when_malformed(world: &RefCell<EndpointWorld>) {
    world
        .borrow_mut()
        .first_client()
        .send(Frame::text("{\"type\": \"NoSuchRequest\"".to_owned()))
        .expect("send malformed frame");
}

#[when("the first client asks for the change log of {root}")]
fn when_log(world: &RefCell<EndpointWorld>, root: String) {
    let request = Request::log_folder(root.as_str(), LogOptions::page(0));
    send(world.borrow_mut().first_client(), &request.into());
}

#[then("the upgrade is refused with status {status}")]
fn then_refused(world: &RefCell<EndpointWorld>, status: u16) {
    assert_eq!(world.borrow().refusal, Some(status));
}

#[then("the refusal is reported with status {status}")]
fn then_refusal_reported(world: &RefCell<EndpointWorld>, status: u16) {
    let world = world.borrow();
    let rejections = world.reporter.rejections.lock().expect("rejections lock");
    assert_eq!(*rejections, [status]);
}

#[then("every client receives exactly one answer to request {id} listing {root}")]
fn then_each_answered(world: &RefCell<EndpointWorld>, id: u64, root: String) {
    for socket in &mut world.borrow_mut().clients {
        let Message::Response(Response {
            request_id, body, ..
        }) = receive(socket)
        else {
            panic!("expected a response");
        };
        assert_eq!(request_id, RequestId::new(id));
        let ResponseBody::ListWatches { watches } = body else {
            panic!("expected a watch list");
        };
        let roots: Vec<&str> = watches.iter().map(|watch| watch.root.as_str()).collect();
        assert_eq!(roots, [root.as_str()]);
        assert_quiet(socket);
    }
}

#[then("every client receives a sync start for {root}")]
fn then_each_sync_start(world: &RefCell<EndpointWorld>, root: String) {
    for socket in &mut world.borrow_mut().clients {
        assert_eq!(
            receive(socket),
            Message::Event(Event::WatchStartSync {
                root: root.as_str().into()
            })
        );
    }
}

#[then("every session has been reported closed")]
fn then_sessions_closed(world: &RefCell<EndpointWorld>) {
    let world = world.borrow();
    let mut opened = world.reporter.opened.lock().expect("opened lock").clone();
    let mut closed = world.reporter.closed.lock().expect("closed lock").clone();
    opened.sort_unstable();
    closed.sort_unstable();
    assert!(!opened.is_empty());
    assert_eq!(closed, opened);
}

#[then("the first client receives status {status}")]
fn then_status(world: &RefCell<EndpointWorld>, status: u16) {
    let mut world = world.borrow_mut();
    let Message::Response(response) = receive(world.first_client()) else {
        panic!("expected a response");
    };
    assert_eq!(response.code, status);
    assert_eq!(response.body, ResponseBody::BadRequest);
}

#[scenario(path = "tests/features/endpoint_sessions.feature")]
fn endpoint_sessions(world: RefCell<EndpointWorld>) {
    let _ = world;
}
