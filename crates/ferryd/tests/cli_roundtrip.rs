//! The `ferry` command-line client talking to a live daemon endpoint.

use std::ffi::OsString;
use std::net::TcpListener;
use std::process::ExitCode;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use ferry_bus::EventBus;
use ferry_config::{DaemonDescriptor, DaemonUser, WatchedFolder, WebServerSettings};
use ferry_messages::model::{
    DatabaseVersionHeader, FileStatus, LightweightDatabaseVersion, LogOptions, LsOptions, LsResult,
};
use ferryd::{
    BackendError, EndpointHandle, HistoryBackend, RequestService, StructuredHealthReporter,
    WebSocketEndpoint,
};
use rstest::{fixture, rstest};
use tempfile::TempDir;

/// Knows the status of files and nothing else.
struct StatusOnly;

impl HistoryBackend for StatusOnly {
    fn ls_folder(&self, _root: &Utf8Path, _options: &LsOptions) -> Result<LsResult, BackendError> {
        Err(BackendError::Unsupported {
            operation: "folder listing",
        })
    }

    fn log_folder(
        &self,
        _root: &Utf8Path,
        _options: &LogOptions,
    ) -> Result<Vec<LightweightDatabaseVersion>, BackendError> {
        Err(BackendError::Failed {
            operation: "change log",
            message: "database locked".to_owned(),
        })
    }

    fn database_version_headers(
        &self,
        _root: &Utf8Path,
    ) -> Result<Vec<DatabaseVersionHeader>, BackendError> {
        Ok(Vec::new())
    }

    fn file_status(&self, _root: &Utf8Path, _file: &Utf8Path) -> Result<FileStatus, BackendError> {
        Ok(FileStatus::Sync)
    }
}

struct LiveDaemon {
    dir: TempDir,
    handle: Option<EndpointHandle>,
}

impl LiveDaemon {
    fn config_dir(&self) -> &str {
        self.dir.path().to_str().expect("utf8 temp dir")
    }

    fn run(&self, command: &[&str]) -> (ExitCode, String) {
        let args: Vec<OsString> = ["ferry", "--config-dir", self.config_dir()]
            .into_iter()
            .chain(["--request-timeout-ms", "3000", "--reconnect-backoff-ms", "50"])
            .chain(command.iter().copied())
            .map(OsString::from)
            .collect();
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let exit_code = ferry_client::run(args, &mut stdout, &mut stderr);
        let stdout = String::from_utf8(stdout).expect("utf8 stdout");
        (exit_code, stdout)
    }
}

impl Drop for LiveDaemon {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.shutdown();
            drop(handle.join());
        }
    }
}

#[fixture]
fn daemon() -> LiveDaemon {
    let dir = TempDir::new().expect("temp dir");
    let config_dir =
        Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8 temp dir");
    // The client dials the port named in the descriptor, so it must be fixed
    // before the endpoint binds.
    let port = TcpListener::bind("127.0.0.1:0")
        .and_then(|probe| probe.local_addr())
        .expect("free port")
        .port();
    let descriptor = DaemonDescriptor {
        web_server: WebServerSettings {
            bind_address: "127.0.0.1".to_owned(),
            bind_port: port,
        },
        users: vec![DaemonUser::new("gui", "secret")],
        port_user: None,
        folders: vec![WatchedFolder {
            path: "/sync".into(),
            enabled: true,
        }],
    };
    descriptor.store(&config_dir).expect("store descriptor");

    let bus = Arc::new(EventBus::new("daemon"));
    bus.register(Arc::new(RequestService::new(
        Arc::clone(&bus),
        &descriptor,
        Arc::new(StatusOnly),
    )));
    let handle = WebSocketEndpoint::bind(descriptor)
        .expect("bind endpoint")
        .start(bus, Arc::new(StructuredHealthReporter::new()))
        .expect("start endpoint");
    LiveDaemon {
        dir,
        handle: Some(handle),
    }
}

#[rstest]
fn watches_are_listed_from_the_descriptor(daemon: LiveDaemon) {
    let (exit_code, stdout) = daemon.run(&["watches"]);

    assert_eq!(exit_code, ExitCode::SUCCESS);
    assert!(stdout.contains("ListWatchesManagementResponse"), "{stdout}");
    assert!(stdout.contains("/sync"), "{stdout}");
}

#[rstest]
fn file_status_is_answered_by_the_backend(daemon: LiveDaemon) {
    let (exit_code, stdout) = daemon.run(&["status", "/sync/notes.txt"]);

    assert_eq!(exit_code, ExitCode::SUCCESS);
    assert!(stdout.contains("\"SYNC\""), "{stdout}");
}

#[rstest]
#[case(&["log", "/elsewhere"], "not inside a watched folder")]
#[case(&["log", "/sync"], "database locked")]
#[case(&["ls", "/sync"], "not supported")]
fn daemon_failures_fail_the_command(
    daemon: LiveDaemon,
    #[case] command: &[&str],
    #[case] snippet: &str,
) {
    let (exit_code, stdout) = daemon.run(command);

    assert_eq!(exit_code, ExitCode::FAILURE);
    assert!(stdout.contains(snippet), "{stdout}");
}
