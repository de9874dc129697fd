//! Paged change log of one watched root.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use camino::Utf8PathBuf;
use ferry_bus::{DispatchError, EventBus, PendingRequests, Subscriber, Subscription};
use ferry_messages::model::{LightweightDatabaseVersion, LogOptions};
use ferry_messages::{Message, MessageType, Request, Response, ResponseBody};
use tracing::{debug, warn};

use super::HISTORY_TARGET;

#[derive(Debug, Default)]
struct LogState {
    root: Option<Utf8PathBuf>,
    versions: Vec<LightweightDatabaseVersion>,
    complete: bool,
}

/// Accumulates a root's change log page by page.
///
/// A page holding exactly [`LogOptions::PAGE_SIZE`] versions means more may
/// exist, so the next page is requested straight away; a shorter page ends
/// paging. At most one page request is outstanding, and browsing again
/// discards any response still in flight.
pub struct LogController {
    bus: Arc<EventBus>,
    state: Mutex<LogState>,
    pending: PendingRequests<usize>,
}

impl LogController {
    /// Builds a controller posting on `bus`; register it on the same bus.
    #[must_use]
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            bus,
            state: Mutex::new(LogState::default()),
            pending: PendingRequests::new(),
        }
    }

    /// Starts paging through the log of `root` from the newest version.
    pub fn browse(&self, root: impl Into<Utf8PathBuf>) {
        let root = root.into();
        let request = {
            let mut state = self.lock();
            *state = LogState {
                root: Some(root.clone()),
                ..LogState::default()
            };
            self.pending.clear();
            self.page_request(root, 0)
        };
        self.bus.post(&request.into());
    }

    /// Versions received so far, newest first.
    #[must_use]
    pub fn versions(&self) -> Vec<LightweightDatabaseVersion> {
        self.lock().versions.clone()
    }

    /// Whether the last page has arrived.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.lock().complete
    }

    /// Whether no page request is outstanding.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        let _state = self.lock();
        self.pending.is_empty()
    }

    fn page_request(&self, root: Utf8PathBuf, start: usize) -> Request {
        let request = Request::log_folder(root, LogOptions::page(start));
        self.pending.put(request.id, start);
        request
    }

    fn lock(&self) -> MutexGuard<'_, LogState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Folds one page in and returns the request for the next page, if any.
    fn apply(&self, state: &mut LogState, start: usize, response: &Response) -> Option<Request> {
        let page = match &response.body {
            ResponseBody::LogFolder { database_versions } if response.is_success() => {
                database_versions
            }
            _ => {
                warn!(
                    target: HISTORY_TARGET,
                    start,
                    code = response.code,
                    message = response.message.as_deref().unwrap_or_default(),
                    "change log page failed"
                );
                state.complete = true;
                return None;
            }
        };
        debug!(target: HISTORY_TARGET, start, versions = page.len(), "change log page received");
        state.versions.extend(page.iter().cloned());
        if page.len() == LogOptions::PAGE_SIZE {
            let root = state.root.clone()?;
            Some(self.page_request(root, start + LogOptions::PAGE_SIZE))
        } else {
            state.complete = true;
            None
        }
    }
}

impl Subscriber for LogController {
    fn subscription(&self) -> Subscription {
        Subscription::types([MessageType::LogFolderResponse, MessageType::BadRequestResponse])
    }

    fn on_message(&self, message: &Message) -> Result<(), DispatchError> {
        let Message::Response(response) = message else {
            return Ok(());
        };
        let next = {
            let mut state = self.lock();
            let Some(start) = self.pending.remove(response.request_id) else {
                return Ok(());
            };
            self.apply(&mut state, start, response)
        };
        if let Some(request) = next {
            self.bus.post(&request.into());
        }
        Ok(())
    }
}
