//! Versioned file-history data model.
//!
//! These types are snapshots produced by the daemon's versioning engine.
//! Clients never mutate them; a newer [`FileVersion`] supersedes an older one
//! within the same [`PartialFileHistory`].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use camino::Utf8PathBuf;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use strum::{Display, EnumString};
use time::OffsetDateTime;

/// Kind of filesystem entry a version describes.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum FileType {
    /// Regular file.
    File,
    /// Directory.
    Folder,
    /// Symbolic link.
    Symlink,
}

impl FileType {
    /// Every file type, the default filter for listings.
    #[must_use]
    pub fn all() -> BTreeSet<Self> {
        BTreeSet::from([Self::File, Self::Folder, Self::Symlink])
    }
}

/// How a version relates to its predecessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum FileVersionStatus {
    /// First version of the history.
    New,
    /// Content or metadata changed.
    Changed,
    /// Path changed.
    Renamed,
    /// Entry was deleted; the history ends here.
    Deleted,
}

/// Identifier shared by every version of one logical file.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileHistoryId(String);

impl FileHistoryId {
    /// Wraps a hex-encoded history identifier.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Identifier text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileHistoryId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

/// Immutable snapshot of a file or folder at one logical version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileVersion {
    /// History this version belongs to.
    pub file_history_id: FileHistoryId,
    /// Version number, increasing within the history.
    pub version: u64,
    /// Path relative to the watched root, `/`-separated.
    pub path: String,
    /// Entry kind.
    #[serde(rename = "type")]
    pub file_type: FileType,
    /// Relation to the previous version.
    pub status: FileVersionStatus,
    /// Size in bytes.
    pub size: u64,
    /// Content checksum; absent for folders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    /// Target of a symbolic link.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_target: Option<String>,
    /// POSIX permission string such as `rwxr-xr-x`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub posix_permissions: Option<String>,
    /// DOS attribute string such as `--a-`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dos_attributes: Option<String>,
    /// Filesystem modification time.
    #[serde(with = "time::serde::rfc3339")]
    pub last_modified: OffsetDateTime,
    /// When the version was recorded.
    #[serde(with = "time::serde::rfc3339")]
    pub updated: OffsetDateTime,
}

impl FileVersion {
    /// Final path segment.
    #[must_use]
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// Whether the entry is a directory.
    #[must_use]
    pub fn is_folder(&self) -> bool {
        self.file_type == FileType::Folder
    }

    /// Whether this version deleted the entry.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.status == FileVersionStatus::Deleted
    }
}

/// Ordered subset of the versions of one file history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialFileHistory {
    /// History identifier.
    pub file_history_id: FileHistoryId,
    /// Versions keyed by version number; serialised as an ordered list.
    #[serde(with = "version_list")]
    pub versions: BTreeMap<u64, FileVersion>,
}

impl PartialFileHistory {
    /// Creates an empty history.
    #[must_use]
    pub const fn new(file_history_id: FileHistoryId) -> Self {
        Self {
            file_history_id,
            versions: BTreeMap::new(),
        }
    }

    /// Records a version, replacing any version with the same number.
    pub fn add_version(&mut self, version: FileVersion) {
        self.versions.insert(version.version, version);
    }

    /// Highest-numbered version.
    #[must_use]
    pub fn last_version(&self) -> Option<&FileVersion> {
        self.versions.values().next_back()
    }
}

mod version_list {
    use super::{BTreeMap, Deserialize, Deserializer, FileVersion, Serializer};

    pub(super) fn serialize<S>(
        versions: &BTreeMap<u64, FileVersion>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_seq(versions.values())
    }

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<BTreeMap<u64, FileVersion>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let list = Vec::<FileVersion>::deserialize(deserializer)?;
        Ok(list
            .into_iter()
            .map(|version| (version.version, version))
            .collect())
    }
}

/// Paths touched by one synchronisation transaction.
///
/// The three sets are disjoint: a path appears in at most one of them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeSet {
    /// Paths that did not exist before.
    #[serde(default)]
    pub new_files: BTreeSet<String>,
    /// Paths whose content or metadata changed.
    #[serde(default)]
    pub changed_files: BTreeSet<String>,
    /// Paths that were removed.
    #[serde(default)]
    pub deleted_files: BTreeSet<String>,
}

impl ChangeSet {
    /// Whether the transaction touched nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.new_files.is_empty() && self.changed_files.is_empty() && self.deleted_files.is_empty()
    }

    /// New and changed paths, in that order.
    pub fn new_and_changed(&self) -> impl Iterator<Item = &str> {
        self.new_files
            .iter()
            .chain(self.changed_files.iter())
            .map(String::as_str)
    }
}

/// One synchronisation transaction as presented by the change log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LightweightDatabaseVersion {
    /// When the transaction was committed.
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
    /// Client that committed the transaction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<String>,
    /// Paths touched by the transaction.
    pub change_set: ChangeSet,
}

/// Per-client logical counters of a database version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VectorClock(BTreeMap<String, u64>);

impl VectorClock {
    /// Sets the counter for `client`.
    pub fn set(&mut self, client: impl Into<String>, value: u64) {
        self.0.insert(client.into(), value);
    }

    /// Counter for `client`, zero when absent.
    #[must_use]
    pub fn get(&self, client: &str) -> u64 {
        self.0.get(client).copied().unwrap_or_default()
    }
}

impl fmt::Display for VectorClock {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("(")?;
        for (index, (client, value)) in self.0.iter().enumerate() {
            if index > 0 {
                formatter.write_str(",")?;
            }
            write!(formatter, "{client}{value}")?;
        }
        formatter.write_str(")")
    }
}

/// Header identifying one database version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseVersionHeader {
    /// Commit time.
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
    /// Machine name of the committing client.
    pub client: String,
    /// Vector clock after the commit.
    pub vector_clock: VectorClock,
}

/// Synchronised root folder known to the daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Watch {
    /// Absolute path of the root.
    pub root: Utf8PathBuf,
    /// Sync state, when the daemon has seen the root sync at least once.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<WatchStatus>,
}

impl Watch {
    /// Watch on `root` with no known sync state.
    #[must_use]
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self {
            root: root.into(),
            status: None,
        }
    }
}

/// Whether a watched root is being synchronised right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum WatchStatus {
    /// A sync run is in progress.
    Syncing,
    /// The last sync run finished.
    InSync,
}

/// Sync state reported to file manager extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum FileStatus {
    /// Nothing to report.
    Nop,
    /// Currently synchronising.
    Sync,
    /// Not yet synchronised.
    New,
    /// Excluded by ignore rules.
    Ignore,
    /// Up to date.
    Ok,
    /// Synchronisation failed.
    Error,
}

/// Parameters of a folder listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LsOptions {
    /// Path prefix to list, or a file history id when
    /// [`Self::file_history_id`] is set.
    pub path_expression: String,
    /// Point in time to list; the newest state when absent.
    #[serde(with = "time::serde::rfc3339::option")]
    pub date: Option<OffsetDateTime>,
    /// Descend into subfolders.
    pub recursive: bool,
    /// Populate [`LsResult::file_versions`].
    pub fetch_histories: bool,
    /// Interpret the path expression as a file history id.
    pub file_history_id: bool,
    /// Include deleted versions.
    pub deleted: bool,
    /// Entry kinds to include.
    pub file_types: BTreeSet<FileType>,
}

impl Default for LsOptions {
    fn default() -> Self {
        Self {
            path_expression: String::new(),
            date: None,
            recursive: false,
            fetch_histories: false,
            file_history_id: false,
            deleted: false,
            file_types: FileType::all(),
        }
    }
}

impl LsOptions {
    /// Lists the immediate children of `prefix` as of `date`.
    #[must_use]
    pub fn children_of(prefix: impl Into<String>, date: Option<OffsetDateTime>) -> Self {
        Self {
            path_expression: prefix.into(),
            date,
            ..Self::default()
        }
    }

    /// Fetches every version of one history, including deleted ones.
    #[must_use]
    pub fn file_history(id: &FileHistoryId) -> Self {
        Self {
            path_expression: id.as_str().to_owned(),
            fetch_histories: true,
            file_history_id: true,
            deleted: true,
            file_types: BTreeSet::from([FileType::File, FileType::Symlink]),
            ..Self::default()
        }
    }
}

/// Result of a folder listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LsResult {
    /// Matching entries, one version each.
    #[serde(default)]
    pub file_list: Vec<FileVersion>,
    /// Histories of the matching entries when requested.
    #[serde(default)]
    pub file_versions: BTreeMap<FileHistoryId, PartialFileHistory>,
}

/// Parameters of a change log page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogOptions {
    /// Index of the first database version, newest first.
    pub start_database_version_index: usize,
    /// Page size.
    pub max_database_version_count: usize,
    /// Per-version cap on reported file changes.
    pub max_file_history_count: usize,
}

impl LogOptions {
    /// Database versions requested per page by the history browser.
    pub const PAGE_SIZE: usize = 15;
    /// File changes reported per database version by the history browser.
    pub const FILE_COUNT: usize = 10;

    /// Options for the page starting at `start`.
    #[must_use]
    pub const fn page(start: usize) -> Self {
        Self {
            start_database_version_index: start,
            max_database_version_count: Self::PAGE_SIZE,
            max_file_history_count: Self::FILE_COUNT,
        }
    }
}
