//! One-shot daemon session used by the CLI commands.

use std::sync::Arc;
use std::sync::mpsc::{self, Sender};
use std::thread;
use std::time::{Duration, Instant};

use ferry_bus::{DispatchError, EventBus, PendingRequests, Subscriber, Subscription};
use ferry_config::Config;
use ferry_messages::{Message, MessageKind, Request, Response};
use tracing::debug;

use super::{CLI_TARGET, CliError};
use crate::transport::{Connector, TransportClient};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Hands each response to the caller blocked on its request.
#[derive(Default)]
struct ResponseWaiter {
    pending: PendingRequests<Sender<Response>>,
}

impl Subscriber for ResponseWaiter {
    fn subscription(&self) -> Subscription {
        Subscription::kinds([MessageKind::Response])
    }

    fn on_message(&self, message: &Message) -> Result<(), DispatchError> {
        let Message::Response(response) = message else {
            return Ok(());
        };
        if let Some(waiting) = self.pending.remove(response.request_id)
            && waiting.send(response.clone()).is_err()
        {
            debug!(target: CLI_TARGET, request_id = %response.request_id, "caller stopped waiting");
        }
        Ok(())
    }
}

/// Client bus wired to a running transport.
pub(crate) struct ClientSession {
    bus: Arc<EventBus>,
    transport: TransportClient,
    waiter: Arc<ResponseWaiter>,
    timeout: Duration,
}

impl ClientSession {
    /// Starts the transport without waiting for the daemon.
    pub(crate) fn start(config: &Config, connector: Arc<dyn Connector>) -> Result<Self, CliError> {
        let bus = Arc::new(EventBus::new("ferry"));
        let waiter = Arc::new(ResponseWaiter::default());
        bus.register(waiter.clone());
        let transport = TransportClient::new(
            Arc::clone(&bus),
            connector,
            config.config_dir(),
            config.reconnect_backoff(),
        );
        transport.start()?;
        Ok(Self {
            bus,
            transport,
            waiter,
            timeout: config.request_timeout(),
        })
    }

    /// Starts the transport and waits for the first session.
    pub(crate) fn connect(config: &Config, connector: Arc<dyn Connector>) -> Result<Self, CliError> {
        let session = Self::start(config, connector)?;
        if !session.transport.wait_until_connected(session.timeout) {
            return Err(CliError::NotConnected {
                timeout_ms: session.timeout.as_millis(),
            });
        }
        Ok(session)
    }

    pub(crate) const fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Posts `request` and blocks until its response or the timeout.
    pub(crate) fn call(&self, request: Request) -> Result<Response, CliError> {
        let (sender, receiver) = mpsc::channel();
        let id = request.id;
        let what = request.body.message_type().tag();
        self.waiter.pending.put(id, sender);
        debug!(target: CLI_TARGET, request_id = %id, message_type = what, "sending request");
        self.bus.post(&request.into());
        receiver.recv_timeout(self.timeout).map_err(|_| {
            self.waiter.pending.remove(id);
            CliError::Timeout {
                what: "the daemon's response",
                timeout_ms: self.timeout.as_millis(),
            }
        })
    }

    /// Polls `ready` until it holds or the timeout elapses.
    pub(crate) fn wait_for(
        &self,
        what: &'static str,
        ready: impl Fn() -> bool,
    ) -> Result<(), CliError> {
        let deadline = Instant::now() + self.timeout;
        while !ready() {
            if Instant::now() >= deadline {
                return Err(CliError::Timeout {
                    what,
                    timeout_ms: self.timeout.as_millis(),
                });
            }
            thread::sleep(POLL_INTERVAL);
        }
        Ok(())
    }

    /// Stops the transport.
    pub(crate) fn close(self) -> Result<(), CliError> {
        self.transport.stop()?;
        Ok(())
    }
}
