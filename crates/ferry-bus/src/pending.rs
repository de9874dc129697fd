//! Outstanding requests keyed by correlation id.

use dashmap::DashMap;
use ferry_messages::RequestId;

/// Map from request id to whatever the requester needs when the response
/// arrives.
///
/// Each entry is removed at most once: concurrent `remove` calls for the same
/// id see the entry exactly once between them. There is no expiry; entries
/// for requests that are never answered stay until removed.
#[derive(Debug)]
pub struct PendingRequests<T> {
    entries: DashMap<RequestId, T>,
}

impl<T> Default for PendingRequests<T> {
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl<T> PendingRequests<T> {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an outstanding request, returning any entry it replaced.
    pub fn put(&self, id: RequestId, entry: T) -> Option<T> {
        self.entries.insert(id, entry)
    }

    /// Takes the entry for `id`, if still present.
    pub fn remove(&self, id: RequestId) -> Option<T> {
        self.entries.remove(&id).map(|(_, entry)| entry)
    }

    /// Whether `id` is still outstanding.
    #[must_use]
    pub fn contains(&self, id: RequestId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Number of outstanding requests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is outstanding.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every outstanding entry.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Drops the entries for which `keep` returns `false`.
    pub fn retain(&self, mut keep: impl FnMut(RequestId, &T) -> bool) {
        self.entries.retain(|id, entry| keep(*id, entry));
    }
}
