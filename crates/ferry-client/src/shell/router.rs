//! Routing between shell connections and the client bus.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use ferry_bus::{DispatchError, EventBus, PendingRequests, Subscriber, Subscription};
use ferry_messages::{Message, MessageType, Request, Response, ResponseBody};
use tracing::{debug, info, warn};

use super::listener::ShellListener;
use super::protocol::{ERROR_LINE, ShellCommand, parse_line, register_line, status_line};
use super::stream::ConnectionStream;
use super::{SHELL_TARGET, ShellError};

/// Longest accepted line, excluding the newline.
const MAX_LINE_BYTES: usize = 64 * 1024;
const ACCEPT_BACKOFF: Duration = Duration::from_millis(25);
const ERROR_BACKOFF: Duration = Duration::from_millis(150);

/// One read from a shell connection.
enum Inbound {
    Line(String),
    TooLong,
    Closed,
}

/// Where replies for one connection go.
#[derive(Clone)]
struct Client {
    id: u64,
    outgoing: Sender<String>,
}

/// Bridges shell extension connections onto the client bus.
///
/// Status queries become `RetrieveFileStatusManagementRequest`s whose
/// responses are written back to the asking connection only. Watch lists
/// seen on the bus are pushed to every connection.
pub struct ShellRouter {
    bus: Arc<EventBus>,
    pending: PendingRequests<Client>,
    clients: Mutex<Vec<Client>>,
    next_client: AtomicU64,
}

impl ShellRouter {
    /// Builds a router posting on `bus`; register it on the same bus.
    #[must_use]
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            bus,
            pending: PendingRequests::new(),
            clients: Mutex::new(Vec::new()),
            next_client: AtomicU64::new(1),
        }
    }

    /// Starts accepting connections on `listener`, one thread per client.
    pub fn serve(self: &Arc<Self>, listener: ShellListener) -> Result<ShellHandle, ShellError> {
        let stop = Arc::new(AtomicBool::new(false));
        let router = Arc::clone(self);
        let stop_flag = Arc::clone(&stop);
        let accept = thread::Builder::new()
            .name("ferry-shell-accept".to_owned())
            .spawn(move || router.accept_loop(&listener, &stop_flag))
            .map_err(|source| ShellError::Spawn { source })?;
        Ok(ShellHandle {
            stop,
            accept: Some(accept),
        })
    }

    fn accept_loop(self: &Arc<Self>, listener: &ShellListener, stop: &AtomicBool) {
        info!(target: SHELL_TARGET, endpoint = %listener.endpoint(), "shell listener active");
        let mut last_error = None::<io::ErrorKind>;
        while !stop.load(Ordering::SeqCst) {
            match listener.accept() {
                Ok(Some(stream)) => {
                    last_error = None;
                    let router = Arc::clone(self);
                    thread::spawn(move || router.handle(stream));
                }
                Ok(None) => thread::sleep(ACCEPT_BACKOFF),
                Err(error) => {
                    if last_error != Some(error.kind()) {
                        warn!(target: SHELL_TARGET, %error, "shell accept failed");
                    }
                    last_error = Some(error.kind());
                    thread::sleep(ERROR_BACKOFF);
                }
            }
        }
    }

    /// Number of connected extensions.
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.lock_clients().len()
    }

    fn lock_clients(&self) -> MutexGuard<'_, Vec<Client>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn attach(&self) -> (Client, Receiver<String>) {
        let (outgoing, receiver) = mpsc::channel();
        let client = Client {
            id: self.next_client.fetch_add(1, Ordering::Relaxed),
            outgoing,
        };
        self.lock_clients().push(client.clone());
        (client, receiver)
    }

    fn detach(&self, client: &Client) {
        self.lock_clients().retain(|known| known.id != client.id);
        self.pending.retain(|_, waiting| waiting.id != client.id);
    }

    fn handle_line(&self, client: &Client, line: &str) {
        match parse_line(line) {
            Some(ShellCommand::RetrieveStatus(file)) => {
                let request = Request::file_status(file);
                self.pending.put(request.id, client.clone());
                self.bus.post(&request.into());
            }
            None => {
                debug!(target: SHELL_TARGET, client = client.id, "unrecognised shell line");
                Self::reply(client, ERROR_LINE.to_owned());
            }
        }
    }

    fn answer(client: &Client, response: &Response) {
        let line = match &response.body {
            ResponseBody::RetrieveFileStatus { file, status } if response.is_success() => {
                status_line(*status, file)
            }
            _ => ERROR_LINE.to_owned(),
        };
        Self::reply(client, line);
    }

    fn reply(client: &Client, line: String) {
        if client.outgoing.send(line).is_err() {
            debug!(target: SHELL_TARGET, client = client.id, "shell client left before its answer");
        }
    }

    fn broadcast_watches(&self, response: &Response) {
        let ResponseBody::ListWatches { watches } = &response.body else {
            return;
        };
        if !response.is_success() {
            return;
        }
        let lines: Vec<String> = watches.iter().map(|watch| register_line(&watch.root)).collect();
        self.lock_clients().retain(|client| {
            lines
                .iter()
                .all(|line| client.outgoing.send(line.clone()).is_ok())
        });
    }
}

impl Subscriber for ShellRouter {
    fn subscription(&self) -> Subscription {
        Subscription::types([
            MessageType::RetrieveFileStatusManagementResponse,
            MessageType::ListWatchesManagementResponse,
            MessageType::BadRequestResponse,
        ])
    }

    fn on_message(&self, message: &Message) -> Result<(), DispatchError> {
        let Message::Response(response) = message else {
            return Ok(());
        };
        match self.pending.remove(response.request_id) {
            Some(client) => Self::answer(&client, response),
            None => self.broadcast_watches(response),
        }
        Ok(())
    }
}

impl ShellRouter {
    fn handle(&self, stream: ConnectionStream) {
        let writer = match stream.try_clone() {
            Ok(writer) => writer,
            Err(error) => {
                warn!(target: SHELL_TARGET, error = %error, "failed to clone shell connection");
                return;
            }
        };
        let (client, receiver) = self.attach();
        debug!(target: SHELL_TARGET, client = client.id, "shell client connected");
        let writer_thread = thread::spawn(move || write_lines(writer, &receiver));

        let mut reader = BufReader::new(stream);
        loop {
            match read_bounded_line(&mut reader) {
                Ok(Inbound::Line(line)) => self.handle_line(&client, &line),
                Ok(Inbound::TooLong) => {
                    warn!(target: SHELL_TARGET, client = client.id, "shell line too long");
                    break;
                }
                Ok(Inbound::Closed) => break,
                Err(error) => {
                    debug!(target: SHELL_TARGET, client = client.id, error = %error, "shell read failed");
                    break;
                }
            }
        }

        self.detach(&client);
        drop(client);
        if let Err(error) = reader.get_ref().shutdown() {
            debug!(target: SHELL_TARGET, error = %error, "shell connection already closed");
        }
        if writer_thread.join().is_err() {
            warn!(target: SHELL_TARGET, "shell writer thread panicked");
        }
    }
}

/// Stops the accept loop of [`ShellRouter::serve`].
pub struct ShellHandle {
    stop: Arc<AtomicBool>,
    accept: Option<JoinHandle<()>>,
}

impl ShellHandle {
    /// Asks the accept loop to exit.
    pub fn shutdown(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Waits for the accept loop to exit and release the endpoint.
    pub fn join(mut self) -> Result<(), ShellError> {
        match self.accept.take() {
            Some(accept) => accept.join().map_err(|_| ShellError::ThreadPanic),
            None => Ok(()),
        }
    }
}

impl Drop for ShellHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Reads one line of at most [`MAX_LINE_BYTES`] bytes.
///
/// A final line without a newline still counts as a line.
fn read_bounded_line(reader: &mut impl BufRead) -> io::Result<Inbound> {
    let mut buffer = Vec::new();
    let limit = MAX_LINE_BYTES as u64 + 1;
    let read = reader.by_ref().take(limit).read_until(b'\n', &mut buffer)?;
    if read == 0 {
        return Ok(Inbound::Closed);
    }
    if !buffer.ends_with(b"\n") && read as u64 == limit {
        return Ok(Inbound::TooLong);
    }
    Ok(Inbound::Line(String::from_utf8_lossy(&buffer).into_owned()))
}

fn write_lines(mut writer: ConnectionStream, receiver: &Receiver<String>) {
    for line in receiver {
        let written = writer
            .write_all(line.as_bytes())
            .and_then(|()| writer.write_all(b"\n"))
            .and_then(|()| writer.flush());
        if let Err(error) = written {
            debug!(target: SHELL_TARGET, error = %error, "shell write failed");
            break;
        }
    }
}
