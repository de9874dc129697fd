use super::*;

use std::cell::RefCell;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use camino::Utf8PathBuf;
use ferry_config::{DaemonDescriptor, DaemonUser};
use ferry_messages::model::{
    ChangeSet, DatabaseVersionHeader, FileHistoryId, FileType, FileVersion, FileVersionStatus,
    LightweightDatabaseVersion, LsResult, VectorClock, Watch,
};
use ferry_messages::{
    Message, Request, RequestBody, Response, ResponseBody, STATUS_BAD_REQUEST, decode, encode,
};
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use tempfile::TempDir;
use time::OffsetDateTime;
use time::macros::datetime;

use crate::transport::{Session, TransportError};

const WATCHED_ROOT: &str = "/sync";
const LOG_LENGTH: usize = 20;
const BROWSE_DATE: OffsetDateTime = datetime!(2024-05-01 12:00 UTC);

struct StaticConfigLoader {
    config: Config,
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self, _args: &[OsString]) -> Result<Config, CliError> {
        Ok(self.config.clone())
    }
}

/// In-process daemon answering from a fixed folder tree.
#[derive(Default)]
struct FakeDaemon {
    refuse: bool,
    requests: Mutex<Vec<Request>>,
}

impl FakeDaemon {
    fn requests(&self) -> Vec<Request> {
        self.requests.lock().expect("requests lock").clone()
    }

    fn answer(request: &Request) -> Response {
        let id = request.id;
        match &request.body {
            RequestBody::RetrieveFileStatus { .. } => {
                Response::bad_request(id, STATUS_BAD_REQUEST, "status unavailable")
            }
            RequestBody::ListWatches => Response::ok(
                id,
                ResponseBody::ListWatches {
                    watches: vec![Watch::new(WATCHED_ROOT)],
                },
            ),
            body if body.root().is_some_and(|root| root != WATCHED_ROOT) => {
                Response::bad_request(id, STATUS_BAD_REQUEST, "unknown root")
            }
            RequestBody::LsFolder { options, .. } => {
                let file_list = match options.path_expression.as_str() {
                    "" => vec![
                        version("b.txt", FileType::File),
                        version("a", FileType::Folder),
                        version("c", FileType::Folder),
                    ],
                    "a/" => vec![version("a/x.txt", FileType::File)],
                    _ => Vec::new(),
                };
                Response::ok(
                    id,
                    ResponseBody::LsFolder {
                        result: LsResult {
                            file_list,
                            ..LsResult::default()
                        },
                    },
                )
            }
            RequestBody::LogFolder { options, .. } => {
                let start = options.start_database_version_index.min(LOG_LENGTH);
                let end = (start + options.max_database_version_count).min(LOG_LENGTH);
                let database_versions = (start..end)
                    .map(|_| LightweightDatabaseVersion {
                        date: BROWSE_DATE,
                        client: Some("laptop".to_owned()),
                        change_set: ChangeSet::default(),
                    })
                    .collect();
                Response::ok(id, ResponseBody::LogFolder { database_versions })
            }
            RequestBody::GetDatabaseVersionHeaders { root } => Response::ok(
                id,
                ResponseBody::GetDatabaseVersionHeaders {
                    root: root.clone(),
                    database_version_headers: vec![DatabaseVersionHeader {
                        date: BROWSE_DATE,
                        client: "laptop".to_owned(),
                        vector_clock: VectorClock::default(),
                    }],
                },
            ),
        }
    }
}

struct SharedDaemon(Arc<FakeDaemon>);

impl Connector for SharedDaemon {
    fn connect(
        &self,
        _descriptor: &DaemonDescriptor,
        _user: &DaemonUser,
    ) -> Result<Box<dyn Session>, TransportError> {
        if self.0.refuse {
            return Err(TransportError::Rejected { status: 401 });
        }
        Ok(Box::new(FakeSession {
            daemon: Arc::clone(&self.0),
            replies: VecDeque::new(),
        }))
    }
}

struct FakeSession {
    daemon: Arc<FakeDaemon>,
    replies: VecDeque<String>,
}

impl Session for FakeSession {
    fn send_text(&mut self, frame: &str) -> Result<(), TransportError> {
        let Ok(Message::Request(request)) = decode(frame) else {
            return Ok(());
        };
        let response = FakeDaemon::answer(&request);
        self.daemon
            .requests
            .lock()
            .expect("requests lock")
            .push(request);
        self.replies
            .push_back(encode(&response.into()).expect("encode response"));
        Ok(())
    }

    fn read_text(&mut self) -> Result<Option<String>, TransportError> {
        let reply = self.replies.pop_front();
        if reply.is_none() {
            thread::sleep(Duration::from_millis(5));
        }
        Ok(reply)
    }

    fn close(&mut self) {}
}

fn version(path: &str, file_type: FileType) -> FileVersion {
    FileVersion {
        file_history_id: FileHistoryId::new(format!("history-{path}")),
        version: 1,
        path: path.to_owned(),
        file_type,
        status: FileVersionStatus::New,
        size: 0,
        checksum: None,
        link_target: None,
        posix_permissions: None,
        dos_attributes: None,
        last_modified: BROWSE_DATE,
        updated: BROWSE_DATE,
    }
}

struct TestWorld {
    config_dir: TempDir,
    daemon: FakeDaemon,
    daemon_handle: Option<Arc<FakeDaemon>>,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    exit_code: Option<ExitCode>,
}

impl TestWorld {
    fn config(&self) -> Config {
        let config_dir = Utf8PathBuf::from_path_buf(self.config_dir.path().to_path_buf())
            .expect("utf8 config dir");
        Config {
            config_dir,
            reconnect_backoff_ms: 20,
            request_timeout_ms: 1_000,
            ..Config::default()
        }
    }

    fn store_descriptor(&self) {
        let descriptor = DaemonDescriptor {
            users: vec![DaemonUser::new("gui", "secret")],
            ..DaemonDescriptor::default()
        };
        descriptor
            .store(&self.config().config_dir)
            .expect("store descriptor");
    }

    fn run(&mut self, command: &str) {
        let args: Vec<OsString> = std::iter::once("ferry")
            .chain(command.split_whitespace())
            .map(|token| OsString::from(token.trim_matches('"')))
            .collect();
        let daemon = Arc::new(std::mem::take(&mut self.daemon));
        let loader = StaticConfigLoader {
            config: self.config(),
        };
        let runner = CliRunner::new(&loader, Arc::new(SharedDaemon(Arc::clone(&daemon))));
        let mut io = IoStreams::new(&mut self.stdout, &mut self.stderr);
        self.exit_code = Some(runner.run(args, &mut io));
        self.daemon_handle = Some(daemon);
    }

    fn stdout_text(&self) -> String {
        String::from_utf8(self.stdout.clone()).expect("stdout utf8")
    }

    fn stderr_text(&self) -> String {
        String::from_utf8(self.stderr.clone()).expect("stderr utf8")
    }

    fn requests(&self) -> Vec<Request> {
        self.daemon_handle
            .as_ref()
            .map(|daemon| daemon.requests())
            .unwrap_or_default()
    }
}

#[fixture]
fn world() -> RefCell<TestWorld> {
    RefCell::new(TestWorld {
        config_dir: tempfile::tempdir().expect("temp dir"),
        daemon: FakeDaemon::default(),
        daemon_handle: None,
        stdout: Vec::new(),
        stderr: Vec::new(),
        exit_code: None,
    })
}

#[given("a daemon watching /sync")]
fn given_daemon(world: &RefCell<TestWorld>) {
    world.borrow().store_descriptor();
}

#[given("a daemon that refuses connections")]
fn given_refusing_daemon(world: &RefCell<TestWorld>) {
    let mut world = world.borrow_mut();
    world.store_descriptor();
    world.daemon.refuse = true;
}

#[given("no daemon descriptor")]
fn given_no_descriptor(world: &RefCell<TestWorld>) {
    let _ = world;
}

#[when("the operator runs {command}")]
fn when_operator_runs(world: &RefCell<TestWorld>, command: String) {
    world.borrow_mut().run(&command);
}

#[then("the CLI succeeds")]
fn then_success(world: &RefCell<TestWorld>) {
    let world = world.borrow();
    assert_eq!(
        world.exit_code.expect("exit code recorded"),
        ExitCode::SUCCESS,
        "stderr: {}",
        world.stderr_text()
    );
}

#[then("the CLI fails")]
fn then_failure(world: &RefCell<TestWorld>) {
    let world = world.borrow();
    assert_eq!(world.exit_code.expect("exit code recorded"), ExitCode::FAILURE);
}

#[then("stdout contains {snippet}")]
fn then_stdout_contains(world: &RefCell<TestWorld>, snippet: String) {
    let stdout = world.borrow().stdout_text();
    let snippet = snippet.trim_matches('"');
    assert!(stdout.contains(snippet), "stdout {stdout:?} did not contain {snippet:?}");
}

#[then("stdout lines are {lines}")]
fn then_stdout_lines(world: &RefCell<TestWorld>, lines: String) {
    let stdout = world.borrow().stdout_text();
    let expected: Vec<&str> = lines.trim_matches('"').split('|').collect();
    assert_eq!(stdout.lines().collect::<Vec<_>>(), expected);
}

#[then("stderr contains {snippet}")]
fn then_stderr_contains(world: &RefCell<TestWorld>, snippet: String) {
    let stderr = world.borrow().stderr_text();
    let snippet = snippet.trim_matches('"');
    assert!(stderr.contains(snippet), "stderr {stderr:?} did not contain {snippet:?}");
}

#[then("the daemon received log pages starting at {starts}")]
fn then_log_pages(world: &RefCell<TestWorld>, starts: String) {
    let expected: Vec<usize> = starts
        .split(',')
        .map(|start| start.trim().parse().expect("numeric start"))
        .collect();
    let requested: Vec<usize> = world
        .borrow()
        .requests()
        .iter()
        .filter_map(|request| match &request.body {
            RequestBody::LogFolder { options, .. } => Some(options.start_database_version_index),
            _ => None,
        })
        .collect();
    assert_eq!(requested, expected);
}

#[then("the folder listings were requested as of the newest database version")]
fn then_listings_dated(world: &RefCell<TestWorld>) {
    let requests = world.borrow().requests();
    let dates: Vec<_> = requests
        .iter()
        .filter_map(|request| match &request.body {
            RequestBody::LsFolder { options, .. } => Some(options.date),
            _ => None,
        })
        .collect();
    assert!(!dates.is_empty());
    assert!(dates.iter().all(|date| *date == Some(BROWSE_DATE)));
}

#[scenario(path = "tests/features/cli.feature")]
fn ferry_cli_behaviour(world: RefCell<TestWorld>) {
    let _ = world;
}
