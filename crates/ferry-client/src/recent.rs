//! Recently changed files across all watched roots.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use camino::{Utf8Path, Utf8PathBuf};
use ferry_bus::{DispatchError, EventBus, PendingRequests, Subscriber, Subscription};
use ferry_messages::model::{ChangeSet, LightweightDatabaseVersion, LogOptions};
use ferry_messages::{Event, Message, MessageType, Request, Response, ResponseBody};
use time::OffsetDateTime;
use tracing::{debug, warn};

const RECENT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::recent");

/// Number of entries kept.
pub const RECENT_CHANGES_CAPACITY: usize = 15;

/// One changed file and when the change was synchronised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecentChange {
    /// Absolute path of the file.
    pub path: Utf8PathBuf,
    /// Completion time of the sync that changed it.
    pub date: OffsetDateTime,
}

/// Bounded list of recent changes, newest first.
///
/// A watch list response resets the list and asks the daemon for the latest
/// [`RECENT_CHANGES_CAPACITY`] database versions of every watched root; the
/// log pages that come back seed the list. After that each
/// `WatchEndSyncExternalEvent` is folded in as it arrives. New and changed
/// paths replace any older entry for the same path; deletions are not
/// listed. Whenever the list changes an `UpdateRecentChangesEvent` is posted
/// on the bus.
pub struct RecentChanges {
    bus: Arc<EventBus>,
    entries: Mutex<Vec<RecentChange>>,
    pending: PendingRequests<Utf8PathBuf>,
}

impl RecentChanges {
    /// Log options used to seed the list from one root.
    pub const SEED_OPTIONS: LogOptions = LogOptions {
        start_database_version_index: 0,
        max_database_version_count: RECENT_CHANGES_CAPACITY,
        max_file_history_count: RECENT_CHANGES_CAPACITY,
    };

    /// Builds an empty list posting updates on `bus`.
    #[must_use]
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            bus,
            entries: Mutex::new(Vec::new()),
            pending: PendingRequests::new(),
        }
    }

    /// Current entries, newest first.
    #[must_use]
    pub fn entries(&self) -> Vec<RecentChange> {
        self.lock().clone()
    }

    /// Whether every seeding request has been answered.
    #[must_use]
    pub fn is_seeded(&self) -> bool {
        let _entries = self.lock();
        self.pending.is_empty()
    }

    /// Folds one sync transaction in; returns the new list when it changed.
    pub fn record(
        &self,
        root: &Utf8Path,
        date: OffsetDateTime,
        change_set: &ChangeSet,
    ) -> Option<Vec<Utf8PathBuf>> {
        let mut entries = self.lock();
        merge(&mut entries, root, [(date, change_set)])
    }

    fn lock(&self) -> MutexGuard<'_, Vec<RecentChange>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drops the current list and returns one seeding request per root.
    fn reseed(&self, roots: impl Iterator<Item = Utf8PathBuf>) -> (Vec<Request>, bool) {
        let mut entries = self.lock();
        let cleared = !entries.is_empty();
        entries.clear();
        self.pending.clear();
        let requests = roots
            .map(|root| {
                let request = Request::log_folder(root.clone(), Self::SEED_OPTIONS);
                self.pending.put(request.id, root);
                request
            })
            .collect();
        (requests, cleared)
    }

    fn seed(&self, response: &Response) -> Option<Vec<Utf8PathBuf>> {
        let mut entries = self.lock();
        let root = self.pending.remove(response.request_id)?;
        let ResponseBody::LogFolder { database_versions } = &response.body else {
            warn!(
                target: RECENT_TARGET,
                %root,
                code = response.code,
                message = response.message.as_deref().unwrap_or_default(),
                "recent changes could not be loaded"
            );
            return None;
        };
        debug!(target: RECENT_TARGET, %root, versions = database_versions.len(), "seeding recent changes");
        merge(
            &mut entries,
            &root,
            database_versions
                .iter()
                .map(|LightweightDatabaseVersion { date, change_set, .. }| (*date, change_set)),
        )
    }

    fn publish(&self, recent_changes: Vec<Utf8PathBuf>) {
        debug!(target: RECENT_TARGET, entries = recent_changes.len(), "recent changes updated");
        self.bus
            .post(&Event::UpdateRecentChanges { recent_changes }.into());
    }
}

/// Folds transactions of `root` into `entries`; returns the new paths when
/// the list changed.
fn merge<'a>(
    entries: &mut Vec<RecentChange>,
    root: &Utf8Path,
    transactions: impl IntoIterator<Item = (OffsetDateTime, &'a ChangeSet)>,
) -> Option<Vec<Utf8PathBuf>> {
    let mut next = entries.clone();
    for (date, change_set) in transactions {
        for relative in change_set.new_and_changed() {
            let path = root.join(relative);
            next.retain(|entry| entry.path != path);
            next.push(RecentChange { path, date });
        }
    }
    next.sort_by(|left, right| {
        right
            .date
            .cmp(&left.date)
            .then_with(|| right.path.cmp(&left.path))
    });
    next.truncate(RECENT_CHANGES_CAPACITY);
    if next == *entries {
        return None;
    }
    *entries = next;
    Some(entries.iter().map(|entry| entry.path.clone()).collect())
}

impl Subscriber for RecentChanges {
    fn subscription(&self) -> Subscription {
        Subscription::types([
            MessageType::WatchEndSyncExternalEvent,
            MessageType::ListWatchesManagementResponse,
            MessageType::LogFolderResponse,
            MessageType::BadRequestResponse,
        ])
    }

    fn on_message(&self, message: &Message) -> Result<(), DispatchError> {
        match message {
            Message::Event(Event::WatchEndSync {
                root,
                date,
                change_set,
            }) => {
                if let Some(recent_changes) = self.record(root, *date, change_set) {
                    self.publish(recent_changes);
                }
            }
            Message::Response(response) => match &response.body {
                ResponseBody::ListWatches { watches } if response.is_success() => {
                    let roots = watches.iter().map(|watch| watch.root.clone());
                    let (requests, cleared) = self.reseed(roots);
                    if cleared {
                        self.publish(Vec::new());
                    }
                    for request in requests {
                        self.bus.post(&request.into());
                    }
                }
                ResponseBody::LogFolder { .. } | ResponseBody::BadRequest => {
                    if let Some(recent_changes) = self.seed(response) {
                        self.publish(recent_changes);
                    }
                }
                _ => {}
            },
            _ => {}
        }
        Ok(())
    }
}
