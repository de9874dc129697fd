//! Daemon connection descriptor.
//!
//! The daemon owns `daemon.json` in the per-user configuration directory. It
//! names the WebSocket bind address, the users allowed to connect, and the
//! folders the daemon watches. Clients read it to discover where and as whom
//! to connect; a missing file or an empty user list is fatal for them.

use std::fmt;
use std::fs;
use std::io;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// File name of the descriptor inside the configuration directory.
pub const DAEMON_DESCRIPTOR_FILE: &str = "daemon.json";

const WEBSOCKET_PATH: &str = "/api/ws";
const BASIC_PREFIX: &str = "Basic ";

/// Connection details published by the daemon.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DaemonDescriptor {
    /// WebSocket listener settings.
    #[serde(default)]
    pub web_server: WebServerSettings,
    /// Users allowed to open a session.
    #[serde(default)]
    pub users: Vec<DaemonUser>,
    /// Credentials of the local command-line port, tried after `users`.
    #[serde(default)]
    pub port_user: Option<DaemonUser>,
    /// Folders the daemon synchronises.
    #[serde(default)]
    pub folders: Vec<WatchedFolder>,
}

/// Bind address of the daemon's WebSocket endpoint.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WebServerSettings {
    /// Host or address to bind and connect to.
    pub bind_address: String,
    /// TCP port.
    pub bind_port: u16,
}

impl Default for WebServerSettings {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_owned(),
            bind_port: 8443,
        }
    }
}

/// Credentials accepted by the daemon.
#[derive(Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct DaemonUser {
    /// User name.
    pub username: String,
    /// Plain-text password shared between daemon and clients.
    pub password: String,
}

impl fmt::Debug for DaemonUser {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("DaemonUser")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl DaemonUser {
    /// Builds a user entry.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Value of the `Authorization` header for HTTP Basic authentication.
    #[must_use]
    pub fn basic_authorization(&self) -> String {
        let encoded = STANDARD.encode(format!("{}:{}", self.username, self.password));
        format!("{BASIC_PREFIX}{encoded}")
    }
}

/// One synchronised folder.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct WatchedFolder {
    /// Absolute path of the folder.
    pub path: Utf8PathBuf,
    /// Disabled folders stay in the file but are not reported as watches.
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

const fn enabled_by_default() -> bool {
    true
}

impl DaemonDescriptor {
    /// Location of the descriptor inside `config_dir`.
    #[must_use]
    pub fn path_in(config_dir: &Utf8Path) -> Utf8PathBuf {
        config_dir.join(DAEMON_DESCRIPTOR_FILE)
    }

    /// Reads and parses the descriptor from `config_dir`.
    pub fn load(config_dir: &Utf8Path) -> Result<Self, DescriptorError> {
        let path = Self::path_in(config_dir);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                return Err(DescriptorError::Missing { path });
            }
            Err(source) => return Err(DescriptorError::Read { path, source }),
        };
        serde_json::from_str(&contents).map_err(|source| DescriptorError::Parse { path, source })
    }

    /// Writes the descriptor as pretty JSON into `config_dir`.
    pub fn store(&self, config_dir: &Utf8Path) -> Result<Utf8PathBuf, DescriptorError> {
        let path = Self::path_in(config_dir);
        let contents = serde_json::to_string_pretty(self)
            .map_err(|source| DescriptorError::Parse {
                path: path.clone(),
                source,
            })?;
        fs::create_dir_all(config_dir.as_std_path())
            .and_then(|()| fs::write(&path, contents))
            .map_err(|source| DescriptorError::Write {
                path: path.clone(),
                source,
            })?;
        Ok(path)
    }

    /// Every accepted user: the configured users, then the port user.
    pub fn all_users(&self) -> impl Iterator<Item = &DaemonUser> {
        self.users.iter().chain(self.port_user.as_ref())
    }

    /// User a client should authenticate as.
    pub fn first_user(&self) -> Result<&DaemonUser, DescriptorError> {
        self.all_users().next().ok_or(DescriptorError::NoUsers)
    }

    /// Finds the user matching an `Authorization: Basic` header value.
    #[must_use]
    pub fn authenticate(&self, authorization: &str) -> Option<&DaemonUser> {
        let encoded = authorization.strip_prefix(BASIC_PREFIX)?;
        let decoded = STANDARD.decode(encoded.trim()).ok()?;
        let plain = String::from_utf8(decoded).ok()?;
        let (username, password) = plain.split_once(':')?;
        self.all_users()
            .find(|user| user.username == username && user.password == password)
    }

    /// `ws://` URL of the daemon's WebSocket endpoint.
    #[must_use]
    pub fn websocket_url(&self) -> String {
        format!(
            "ws://{}:{}{WEBSOCKET_PATH}",
            self.web_server.bind_address, self.web_server.bind_port
        )
    }

    /// Origin a local client declares when connecting.
    #[must_use]
    pub fn origin(&self) -> String {
        format!(
            "http://{}:{}",
            self.web_server.bind_address, self.web_server.bind_port
        )
    }

    /// Whether a declared `Origin` header names this daemon's endpoint.
    #[must_use]
    pub fn accepts_origin(&self, origin: &str) -> bool {
        let authority = format!(
            "{}:{}",
            self.web_server.bind_address, self.web_server.bind_port
        );
        origin
            .strip_prefix("http://")
            .or_else(|| origin.strip_prefix("https://"))
            .is_some_and(|rest| rest.trim_end_matches('/') == authority)
    }

    /// Enabled watch folders in declaration order.
    pub fn enabled_folders(&self) -> impl Iterator<Item = &Utf8Path> {
        self.folders
            .iter()
            .filter(|folder| folder.enabled)
            .map(|folder| folder.path.as_path())
    }
}

/// Errors raised while reading the daemon descriptor.
#[derive(Debug, Error)]
pub enum DescriptorError {
    /// No descriptor exists in the configuration directory.
    #[error("daemon configuration does not exist at {path}")]
    Missing {
        /// Expected descriptor location.
        path: Utf8PathBuf,
    },
    /// The descriptor could not be read.
    #[error("failed to read daemon configuration {path}: {source}")]
    Read {
        /// Descriptor location.
        path: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The descriptor could not be written.
    #[error("failed to write daemon configuration {path}: {source}")]
    Write {
        /// Descriptor location.
        path: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The descriptor is not valid JSON for [`DaemonDescriptor`].
    #[error("daemon configuration {path} is invalid: {source}")]
    Parse {
        /// Descriptor location.
        path: Utf8PathBuf,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
    /// The descriptor lists no users.
    #[error("daemon configuration does not contain any users")]
    NoUsers,
}
