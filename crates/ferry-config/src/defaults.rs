use std::env;

use camino::Utf8PathBuf;

#[cfg(unix)]
use dirs::runtime_dir;
#[cfg(unix)]
use libc::geteuid;

use crate::LogFormat;
use crate::socket::SocketEndpoint;

/// TCP port for the shell extension endpoint where Unix sockets are missing.
pub const DEFAULT_SHELL_PORT: u16 = 12345;

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Pause between transport reconnect attempts.
pub const DEFAULT_RECONNECT_BACKOFF_MS: u64 = 5_000;

/// How long the CLI waits for a daemon response.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

/// Owned log filter value used where allocation is required (e.g. serde).
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the binaries.
#[must_use]
pub const fn default_log_format() -> LogFormat {
    LogFormat::Json
}

pub(crate) const fn default_reconnect_backoff_ms() -> u64 {
    DEFAULT_RECONNECT_BACKOFF_MS
}

pub(crate) const fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}

/// Per-user configuration directory, `<config>/ferry`.
///
/// Falls back to `~/.ferry` and finally to the temporary directory when the
/// platform reports no configuration directory.
#[must_use]
pub fn default_config_dir() -> Utf8PathBuf {
    if let Some(dir) = dirs::config_dir().and_then(|path| Utf8PathBuf::from_path_buf(path).ok()) {
        return dir.join("ferry");
    }
    if let Some(home) = dirs::home_dir().and_then(|path| Utf8PathBuf::from_path_buf(path).ok()) {
        return home.join(".ferry");
    }
    fallback_base_directory().join("ferry")
}

/// Computes the default shell extension endpoint.
#[must_use]
pub fn default_shell_socket() -> SocketEndpoint {
    default_shell_socket_inner()
}

#[cfg(unix)]
fn default_shell_socket_inner() -> SocketEndpoint {
    let runtime = runtime_dir().and_then(|path| Utf8PathBuf::from_path_buf(path).ok());
    let mut base = match runtime {
        Some(dir) => dir.join("ferry"),
        None => {
            let uid = unsafe { geteuid() };
            fallback_base_directory()
                .join("ferry")
                .join(format!("uid-{uid}"))
        }
    };
    base.push("shell.sock");
    SocketEndpoint::unix(base)
}

#[cfg(not(unix))]
fn default_shell_socket_inner() -> SocketEndpoint {
    SocketEndpoint::tcp("127.0.0.1", DEFAULT_SHELL_PORT)
}

fn fallback_base_directory() -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(env::temp_dir()).unwrap_or_else(|_| Utf8PathBuf::from("/tmp"))
}
