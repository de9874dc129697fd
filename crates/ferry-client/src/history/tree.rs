//! Lazily loaded folder tree of one watched root.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use camino::Utf8PathBuf;
use ferry_bus::{DispatchError, EventBus, PendingRequests, Subscriber, Subscription};
use ferry_messages::model::{FileVersion, LsOptions};
use ferry_messages::{Message, MessageType, Request, Response, ResponseBody};
use time::OffsetDateTime;
use tracing::{debug, warn};

use super::{HISTORY_TARGET, HistoryError};

/// What the tree presents below one folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeNode {
    /// Placeholder shown until the folder's listing arrives.
    Loading,
    /// One listed entry.
    Entry(FileVersion),
}

#[derive(Debug)]
enum Listing {
    Loading,
    Loaded(Vec<FileVersion>),
}

#[derive(Debug, Default)]
struct TreeState {
    root: Option<Utf8PathBuf>,
    date: Option<OffsetDateTime>,
    listings: HashMap<String, Listing>,
    expanded: BTreeSet<String>,
}

/// Rebuilds a root's folder tree from per-folder listings.
///
/// Folder paths are relative to the root with `/` separators; the empty path
/// is the root itself. Expanding a folder requests its listing and every
/// ancestor listing that is not loaded yet. Listings present folders first,
/// keeping the daemon's relative order within folders and within files.
pub struct TreeController {
    bus: Arc<EventBus>,
    state: Mutex<TreeState>,
    pending: PendingRequests<String>,
}

impl TreeController {
    /// Builds a controller posting on `bus`; register it on the same bus.
    #[must_use]
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            bus,
            state: Mutex::new(TreeState::default()),
            pending: PendingRequests::new(),
        }
    }

    /// Starts browsing `root` as of `date`, discarding the previous tree.
    pub fn set_root(&self, root: impl Into<Utf8PathBuf>, date: Option<OffsetDateTime>) {
        let request = {
            let mut state = self.lock();
            *state = TreeState {
                root: Some(root.into()),
                date,
                ..TreeState::default()
            };
            self.pending.clear();
            self.request_listing(&mut state, "")
        };
        self.dispatch(request);
    }

    /// Expands `path`, loading it and any ancestor not loaded yet.
    pub fn expand(&self, path: &str) -> Result<(), HistoryError> {
        let path = normalise(path);
        let requests = {
            let mut state = self.lock();
            if state.root.is_none() {
                return Err(HistoryError::NoRootSelected);
            }
            let mut requests = Vec::new();
            for folder in ancestors_and_self(&path) {
                state.expanded.insert(folder.clone());
                if !state.listings.contains_key(&folder) {
                    requests.extend(self.request_listing(&mut state, &folder));
                }
            }
            requests
        };
        self.dispatch(requests);
        Ok(())
    }

    /// Collapses `path`, forgetting it and every expanded folder below it.
    pub fn collapse(&self, path: &str) {
        let path = normalise(path);
        let prefix = format!("{path}/");
        self.lock()
            .expanded
            .retain(|folder| *folder != path && !folder.starts_with(&prefix));
    }

    /// Reloads the whole tree, re-requesting every expanded folder.
    pub fn refresh(&self) -> Result<(), HistoryError> {
        let requests = {
            let mut state = self.lock();
            if state.root.is_none() {
                return Err(HistoryError::NoRootSelected);
            }
            state.listings.clear();
            self.pending.clear();
            let expanded: Vec<String> = state.expanded.iter().cloned().collect();
            let mut requests: Vec<_> = self.request_listing(&mut state, "").into_iter().collect();
            for folder in expanded {
                requests.extend(self.request_listing(&mut state, &folder));
            }
            requests
        };
        self.dispatch(requests);
        Ok(())
    }

    /// Nodes presented below `path`; empty when the folder was never requested.
    #[must_use]
    pub fn children(&self, path: &str) -> Vec<TreeNode> {
        match self.lock().listings.get(&normalise(path)) {
            Some(Listing::Loading) => vec![TreeNode::Loading],
            Some(Listing::Loaded(entries)) => entries.iter().cloned().map(TreeNode::Entry).collect(),
            None => Vec::new(),
        }
    }

    /// Whether `path` is currently expanded.
    #[must_use]
    pub fn is_expanded(&self, path: &str) -> bool {
        self.lock().expanded.contains(&normalise(path))
    }

    /// Whether every requested listing has arrived.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        let _state = self.lock();
        self.pending.is_empty()
    }

    /// Indented outline of the root and its expanded folders.
    #[must_use]
    pub fn render(&self) -> Vec<String> {
        let state = self.lock();
        let mut lines = Vec::new();
        render_folder(&state, "", 0, &mut lines);
        lines
    }

    /// Marks `folder` as loading and records its listing request.
    fn request_listing(&self, state: &mut TreeState, folder: &str) -> Option<Request> {
        let root = state.root.clone()?;
        state.listings.insert(folder.to_owned(), Listing::Loading);
        let prefix = if folder.is_empty() {
            String::new()
        } else {
            format!("{folder}/")
        };
        let request = Request::ls_folder(root, LsOptions::children_of(prefix, state.date));
        self.pending.put(request.id, folder.to_owned());
        Some(request)
    }

    fn dispatch(&self, requests: impl IntoIterator<Item = Request>) {
        for request in requests {
            self.bus.post(&request.into());
        }
    }

    fn lock(&self) -> MutexGuard<'_, TreeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn apply(state: &mut TreeState, folder: String, response: &Response) {
        let entries = match &response.body {
            ResponseBody::LsFolder { result } if response.is_success() => {
                let mut entries = result.file_list.clone();
                entries.sort_by_key(|entry| !entry.is_folder());
                entries
            }
            _ => {
                warn!(
                    target: HISTORY_TARGET,
                    folder = %folder,
                    code = response.code,
                    message = response.message.as_deref().unwrap_or_default(),
                    "folder listing failed"
                );
                Vec::new()
            }
        };
        debug!(target: HISTORY_TARGET, folder = %folder, entries = entries.len(), "folder listed");
        state.listings.insert(folder, Listing::Loaded(entries));
    }
}

impl Subscriber for TreeController {
    fn subscription(&self) -> Subscription {
        Subscription::types([MessageType::LsFolderResponse, MessageType::BadRequestResponse])
    }

    fn on_message(&self, message: &Message) -> Result<(), DispatchError> {
        let Message::Response(response) = message else {
            return Ok(());
        };
        let mut state = self.lock();
        if let Some(folder) = self.pending.remove(response.request_id) {
            Self::apply(&mut state, folder, response);
        }
        Ok(())
    }
}

fn normalise(path: &str) -> String {
    path.trim_matches('/').to_owned()
}

fn ancestors_and_self(path: &str) -> Vec<String> {
    if path.is_empty() {
        return vec![String::new()];
    }
    path.match_indices('/')
        .map(|(index, _)| path[..index].to_owned())
        .chain(std::iter::once(path.to_owned()))
        .collect()
}

fn render_folder(state: &TreeState, folder: &str, depth: usize, lines: &mut Vec<String>) {
    let indent = "  ".repeat(depth);
    match state.listings.get(folder) {
        Some(Listing::Loading) => lines.push(format!("{indent}(loading)")),
        Some(Listing::Loaded(entries)) => {
            for entry in entries {
                let marker = if entry.is_folder() { "/" } else { "" };
                lines.push(format!("{indent}{}{marker}", entry.name()));
                let child = entry.path.trim_matches('/');
                if entry.is_folder() && state.expanded.contains(child) {
                    render_folder(state, child, depth + 1, lines);
                }
            }
        }
        None => {}
    }
}
