//! Version history of a single file.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use camino::Utf8PathBuf;
use ferry_bus::{DispatchError, EventBus, PendingRequests, Subscriber, Subscription};
use ferry_messages::model::{FileHistoryId, FileVersion, LsOptions};
use ferry_messages::{Message, MessageType, Request, Response, ResponseBody};
use tracing::warn;

use super::HISTORY_TARGET;

/// Fetches every version of one file history, deleted versions included.
pub struct DetailController {
    bus: Arc<EventBus>,
    versions: Mutex<Vec<FileVersion>>,
    pending: PendingRequests<FileHistoryId>,
}

impl DetailController {
    /// Builds a controller posting on `bus`; register it on the same bus.
    #[must_use]
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            bus,
            versions: Mutex::new(Vec::new()),
            pending: PendingRequests::new(),
        }
    }

    /// Requests the history `id` within `root`, replacing the shown one.
    pub fn show(&self, root: impl Into<Utf8PathBuf>, id: &FileHistoryId) {
        let request = {
            let mut versions = self.lock();
            versions.clear();
            self.pending.clear();
            let request = Request::ls_folder(root, LsOptions::file_history(id));
            self.pending.put(request.id, id.clone());
            request
        };
        self.bus.post(&request.into());
    }

    /// Versions of the shown history, oldest first.
    #[must_use]
    pub fn versions(&self) -> Vec<FileVersion> {
        self.lock().clone()
    }

    /// Whether the history request has been answered.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        let _versions = self.lock();
        self.pending.is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<FileVersion>> {
        self.versions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn resolve(id: &FileHistoryId, response: &Response) -> Vec<FileVersion> {
        match &response.body {
            ResponseBody::LsFolder { result } if response.is_success() => {
                match result.file_versions.get(id) {
                    Some(history) => history.versions.values().cloned().collect(),
                    None => result
                        .file_list
                        .iter()
                        .filter(|version| version.file_history_id == *id)
                        .cloned()
                        .collect(),
                }
            }
            _ => {
                warn!(
                    target: HISTORY_TARGET,
                    file_history = id.as_str(),
                    code = response.code,
                    "file history request failed"
                );
                Vec::new()
            }
        }
    }
}

impl Subscriber for DetailController {
    fn subscription(&self) -> Subscription {
        Subscription::types([MessageType::LsFolderResponse, MessageType::BadRequestResponse])
    }

    fn on_message(&self, message: &Message) -> Result<(), DispatchError> {
        let Message::Response(response) = message else {
            return Ok(());
        };
        let mut versions = self.lock();
        if let Some(id) = self.pending.remove(response.request_id) {
            *versions = Self::resolve(&id, response);
        }
        Ok(())
    }
}
