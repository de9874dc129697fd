//! Shared configuration for the Ferry client and daemon.
//!
//! Both binaries resolve a [`Config`] through `ortho_config`, which layers
//! built-in defaults, an optional configuration file (`--config-path` or
//! `FERRY_CONFIG_PATH`), `FERRY_*` environment variables, and command-line
//! flags. The configuration directory named by [`Config::config_dir`] also
//! holds the daemon connection descriptor (see [`DaemonDescriptor`]), which
//! is loaded separately because it is owned by the daemon rather than the
//! user invoking a binary.

use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

mod defaults;
mod descriptor;
mod socket;

pub use defaults::{
    DEFAULT_LOG_FILTER, DEFAULT_RECONNECT_BACKOFF_MS, DEFAULT_REQUEST_TIMEOUT_MS,
    DEFAULT_SHELL_PORT, default_config_dir, default_log_filter_string, default_log_format,
    default_shell_socket,
};
pub use descriptor::{
    DAEMON_DESCRIPTOR_FILE, DaemonDescriptor, DaemonUser, DescriptorError, WatchedFolder,
    WebServerSettings,
};
pub use socket::{SocketEndpoint, SocketParseError, SocketPreparationError};

/// Supported logging output formats.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// One JSON object per event.
    #[default]
    Json,
    /// Human-readable single line output.
    Compact,
}

/// Errors encountered while parsing a [`LogFormat`] from text.
pub type LogFormatParseError = strum::ParseError;

/// Resolved configuration shared by `ferry` and `ferryd`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "FERRY")]
pub struct Config {
    /// Per-user directory holding the daemon descriptor.
    #[ortho_config(default = defaults::default_config_dir())]
    #[serde(default = "defaults::default_config_dir")]
    pub config_dir: Utf8PathBuf,
    /// `tracing` filter expression.
    #[ortho_config(default = defaults::default_log_filter_string())]
    #[serde(default = "defaults::default_log_filter_string")]
    pub log_filter: String,
    /// Output format for structured logs.
    #[ortho_config(default = defaults::default_log_format())]
    #[serde(default = "defaults::default_log_format")]
    pub log_format: LogFormat,
    /// Pause between transport reconnect attempts, in milliseconds.
    #[ortho_config(default = DEFAULT_RECONNECT_BACKOFF_MS)]
    #[serde(default = "defaults::default_reconnect_backoff_ms")]
    pub reconnect_backoff_ms: u64,
    /// How long the CLI waits for a response, in milliseconds.
    #[ortho_config(default = DEFAULT_REQUEST_TIMEOUT_MS)]
    #[serde(default = "defaults::default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Endpoint served for file manager shell extensions.
    #[ortho_config(default = defaults::default_shell_socket())]
    #[serde(default = "defaults::default_shell_socket")]
    pub shell_socket: SocketEndpoint,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_dir: default_config_dir(),
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
            reconnect_backoff_ms: DEFAULT_RECONNECT_BACKOFF_MS,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            shell_socket: default_shell_socket(),
        }
    }
}

impl Config {
    /// Directory holding `daemon.json`.
    #[must_use]
    pub fn config_dir(&self) -> &Utf8Path {
        self.config_dir.as_path()
    }

    /// Filter expression for the tracing subscriber.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Output format for the tracing subscriber.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Fixed pause between reconnect attempts.
    #[must_use]
    pub const fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }

    /// Caller-side response timeout used by the CLI.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Shell extension endpoint.
    #[must_use]
    pub const fn shell_socket(&self) -> &SocketEndpoint {
        &self.shell_socket
    }

    /// Loads the daemon descriptor from [`Self::config_dir`].
    pub fn daemon_descriptor(&self) -> Result<DaemonDescriptor, DescriptorError> {
        DaemonDescriptor::load(self.config_dir())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn defaults_use_json_logging_and_five_second_backoff() {
        let config = Config::default();
        assert_eq!(config.log_format(), LogFormat::Json);
        assert_eq!(config.log_filter(), "info");
        assert_eq!(config.reconnect_backoff(), Duration::from_secs(5));
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn default_config_dir_ends_with_ferry() {
        let config = Config::default();
        assert_eq!(config.config_dir().file_name(), Some("ferry"));
    }

    #[rstest]
    #[case("json", LogFormat::Json)]
    #[case("COMPACT", LogFormat::Compact)]
    fn log_format_parses_case_insensitively(#[case] input: &str, #[case] expected: LogFormat) {
        let parsed: LogFormat = input.parse().expect("log format should parse");
        assert_eq!(parsed, expected);
    }

    #[test]
    fn log_format_rejects_unknown_values() {
        assert!("pretty".parse::<LogFormat>().is_err());
    }
}
