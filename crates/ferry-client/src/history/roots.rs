//! Watched-root selection.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use camino::{Utf8Path, Utf8PathBuf};
use ferry_bus::{DispatchError, EventBus, PendingRequests, Subscriber, Subscription};
use ferry_messages::model::DatabaseVersionHeader;
use ferry_messages::{Message, MessageType, Request, Response, ResponseBody};
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use super::{HISTORY_TARGET, HistoryError};

#[derive(Debug, Default)]
struct Selection {
    roots: Vec<Utf8PathBuf>,
    selected: Option<Utf8PathBuf>,
    headers: Vec<DatabaseVersionHeader>,
}

/// Offers the daemon's watched roots and tracks which one is browsed.
///
/// Every successful watch list seen on the bus replaces the offered roots,
/// including the one the transport requests when it connects. Selecting a
/// root fetches its database version headers; the newest header's date
/// becomes the date to browse the tree at.
pub struct RootSelector {
    bus: Arc<EventBus>,
    selection: Mutex<Selection>,
    pending: PendingRequests<Utf8PathBuf>,
}

impl RootSelector {
    /// Builds a selector posting on `bus`; register it on the same bus.
    #[must_use]
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            bus,
            selection: Mutex::new(Selection::default()),
            pending: PendingRequests::new(),
        }
    }

    /// Asks the daemon for its watched roots.
    pub fn request_watches(&self) {
        self.bus.post(&Request::list_watches().into());
    }

    /// Roots currently on offer, in daemon order.
    #[must_use]
    pub fn roots(&self) -> Vec<Utf8PathBuf> {
        self.lock().roots.clone()
    }

    /// Selects `root` and requests its database version headers.
    pub fn select(&self, root: &Utf8Path) -> Result<(), HistoryError> {
        let request = {
            let mut selection = self.lock();
            if !selection.roots.iter().any(|known| known == root) {
                return Err(HistoryError::UnknownRoot {
                    root: root.to_owned(),
                });
            }
            selection.selected = Some(root.to_owned());
            selection.headers.clear();
            self.pending.clear();
            let request = Request::database_version_headers(root);
            self.pending.put(request.id, root.to_owned());
            request
        };
        self.bus.post(&request.into());
        Ok(())
    }

    /// Currently selected root.
    #[must_use]
    pub fn selected(&self) -> Option<Utf8PathBuf> {
        self.lock().selected.clone()
    }

    /// Headers of the selected root, oldest first.
    #[must_use]
    pub fn headers(&self) -> Vec<DatabaseVersionHeader> {
        self.lock().headers.clone()
    }

    /// Date of the newest header of the selected root.
    #[must_use]
    pub fn browse_date(&self) -> Option<OffsetDateTime> {
        self.lock().headers.last().map(|header| header.date)
    }

    /// Whether the header request has been answered.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        let _selection = self.lock();
        self.pending.is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Selection> {
        self.selection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn apply_watches(selection: &mut Selection, response: &Response) {
        let ResponseBody::ListWatches { watches } = &response.body else {
            return;
        };
        if !response.is_success() {
            return;
        }
        selection.roots = watches.iter().map(|watch| watch.root.clone()).collect();
        let still_watched = selection
            .selected
            .as_ref()
            .is_some_and(|selected| selection.roots.contains(selected));
        if !still_watched {
            selection.selected = None;
            selection.headers.clear();
        }
        info!(target: HISTORY_TARGET, roots = selection.roots.len(), "watched roots updated");
    }

    fn apply_headers(selection: &mut Selection, root: &Utf8Path, response: &Response) {
        match &response.body {
            ResponseBody::GetDatabaseVersionHeaders {
                database_version_headers,
                ..
            } if response.is_success() => {
                debug!(
                    target: HISTORY_TARGET,
                    root = %root,
                    headers = database_version_headers.len(),
                    "database version headers received"
                );
                selection.headers = database_version_headers.clone();
            }
            _ => warn!(
                target: HISTORY_TARGET,
                root = %root,
                code = response.code,
                message = response.message.as_deref().unwrap_or_default(),
                "database version headers failed"
            ),
        }
    }
}

impl Subscriber for RootSelector {
    fn subscription(&self) -> Subscription {
        Subscription::types([
            MessageType::ListWatchesManagementResponse,
            MessageType::GetDatabaseVersionHeadersFolderResponse,
            MessageType::BadRequestResponse,
        ])
    }

    fn on_message(&self, message: &Message) -> Result<(), DispatchError> {
        let Message::Response(response) = message else {
            return Ok(());
        };
        let mut selection = self.lock();
        if let Some(root) = self.pending.remove(response.request_id) {
            Self::apply_headers(&mut selection, &root, response);
        } else {
            Self::apply_watches(&mut selection, response);
        }
        Ok(())
    }
}
