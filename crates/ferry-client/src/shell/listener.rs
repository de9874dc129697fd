//! Bound shell extension endpoint.

use std::io;
use std::net::{SocketAddr, TcpListener};

#[cfg(unix)]
use std::os::unix::net::{UnixListener, UnixStream};

use ferry_config::SocketEndpoint;
use tracing::warn;

use super::stream::ConnectionStream;
use super::{SHELL_TARGET, ShellError};

/// Non-blocking listener on the shell socket.
///
/// A Unix socket file left behind by a crashed client is replaced on bind;
/// one that still accepts connections is refused. The socket file is removed
/// when the listener is dropped.
#[derive(Debug)]
pub struct ShellListener {
    endpoint: SocketEndpoint,
    socket: Socket,
}

#[derive(Debug)]
enum Socket {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(UnixListener),
}

impl ShellListener {
    /// Binds `endpoint`.
    pub fn bind(endpoint: &SocketEndpoint) -> Result<Self, ShellError> {
        endpoint.prepare_filesystem()?;
        let bind_error = |source| ShellError::Bind {
            endpoint: endpoint.to_string(),
            source,
        };
        let socket = match endpoint {
            SocketEndpoint::Tcp { host, port } => {
                let listener = TcpListener::bind((host.as_str(), *port)).map_err(bind_error)?;
                listener.set_nonblocking(true).map_err(bind_error)?;
                Socket::Tcp(listener)
            }
            #[cfg(unix)]
            SocketEndpoint::Unix { path } => {
                reclaim_stale_socket(endpoint)?;
                let listener = UnixListener::bind(path).map_err(bind_error)?;
                listener.set_nonblocking(true).map_err(bind_error)?;
                Socket::Unix(listener)
            }
            #[cfg(not(unix))]
            SocketEndpoint::Unix { .. } => {
                return Err(bind_error(io::Error::from(io::ErrorKind::Unsupported)));
            }
        };
        Ok(Self {
            endpoint: endpoint.clone(),
            socket,
        })
    }

    /// Bound TCP address; `None` for Unix sockets.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &self.socket {
            Socket::Tcp(listener) => listener.local_addr().ok(),
            #[cfg(unix)]
            Socket::Unix(_) => None,
        }
    }

    pub(crate) fn endpoint(&self) -> &SocketEndpoint {
        &self.endpoint
    }

    /// Takes the next pending connection, switched back to blocking mode.
    pub(crate) fn accept(&self) -> io::Result<Option<ConnectionStream>> {
        let accepted = match &self.socket {
            Socket::Tcp(listener) => listener.accept().and_then(|(stream, _)| {
                stream.set_nonblocking(false)?;
                Ok(ConnectionStream::Tcp(stream))
            }),
            #[cfg(unix)]
            Socket::Unix(listener) => listener.accept().and_then(|(stream, _)| {
                stream.set_nonblocking(false)?;
                Ok(ConnectionStream::Unix(stream))
            }),
        };
        match accepted {
            Ok(stream) => Ok(Some(stream)),
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(error) => Err(error),
        }
    }
}

impl Drop for ShellListener {
    fn drop(&mut self) {
        let Some(path) = self.endpoint.unix_path() else {
            return;
        };
        if let Err(error) = std::fs::remove_file(path)
            && error.kind() != io::ErrorKind::NotFound
        {
            warn!(target: SHELL_TARGET, %path, %error, "failed to remove shell socket file");
        }
    }
}

#[cfg(unix)]
fn reclaim_stale_socket(endpoint: &SocketEndpoint) -> Result<(), ShellError> {
    use std::os::unix::fs::FileTypeExt;

    let Some(path) = endpoint.unix_path() else {
        return Ok(());
    };
    let bind_error = |source| ShellError::Bind {
        endpoint: endpoint.to_string(),
        source,
    };
    match std::fs::symlink_metadata(path) {
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(error) => return Err(bind_error(error)),
        Ok(metadata) if !metadata.file_type().is_socket() => {
            return Err(bind_error(io::Error::from(io::ErrorKind::AlreadyExists)));
        }
        Ok(_) => {}
    }
    if UnixStream::connect(path).is_ok() {
        return Err(ShellError::InUse {
            endpoint: endpoint.to_string(),
        });
    }
    std::fs::remove_file(path).map_err(bind_error)
}
