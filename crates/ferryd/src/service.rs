//! Daemon-side answers to client requests.
//!
//! [`RequestService`] subscribes to requests on the daemon bus and posts one
//! response for each. Watches come from the daemon descriptor; everything
//! that needs the versioning engine goes through a [`HistoryBackend`].
//! Sync start and end events seen on the bus set the status reported for
//! each watch.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use camino::{Utf8Path, Utf8PathBuf};
use ferry_bus::{DispatchError, EventBus, Subscriber, Subscription};
use ferry_config::DaemonDescriptor;
use ferry_messages::model::{
    DatabaseVersionHeader, FileStatus, LightweightDatabaseVersion, LogOptions, LsOptions, LsResult,
    Watch, WatchStatus,
};
use ferry_messages::{
    Event, Message, MessageKind, MessageType, Request, RequestBody, Response, ResponseBody, STATUS_BAD_REQUEST,
    STATUS_INTERNAL_ERROR, STATUS_NOT_IMPLEMENTED,
};
use thiserror::Error;
use tracing::{debug, warn};

const SERVICE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::service");

/// Failures reported by a [`HistoryBackend`].
#[derive(Debug, Error)]
pub enum BackendError {
    /// The backend cannot answer this kind of query.
    #[error("{operation} is not supported by this daemon")]
    Unsupported {
        /// Query that was refused.
        operation: &'static str,
    },
    /// The backend tried and failed.
    #[error("{operation} failed: {message}")]
    Failed {
        /// Query that failed.
        operation: &'static str,
        /// Human-readable cause.
        message: String,
    },
}

/// Read access to the versioned file database of the watched roots.
pub trait HistoryBackend: Send + Sync {
    /// Lists entries of `root` matching `options`.
    fn ls_folder(&self, root: &Utf8Path, options: &LsOptions) -> Result<LsResult, BackendError>;

    /// Returns one page of the change log of `root`, newest first.
    fn log_folder(
        &self,
        root: &Utf8Path,
        options: &LogOptions,
    ) -> Result<Vec<LightweightDatabaseVersion>, BackendError>;

    /// Returns the database version headers of `root`, oldest first.
    fn database_version_headers(
        &self,
        root: &Utf8Path,
    ) -> Result<Vec<DatabaseVersionHeader>, BackendError>;

    /// Sync status of `file` inside `root`.
    fn file_status(&self, root: &Utf8Path, file: &Utf8Path) -> Result<FileStatus, BackendError>;
}

/// Backend for a daemon running without a versioning engine.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnimplementedBackend;

impl HistoryBackend for UnimplementedBackend {
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
        Err(BackendError::Unsupported {
            operation: "change log",
        })
    }

    fn database_version_headers(
        &self,
        _root: &Utf8Path,
    ) -> Result<Vec<DatabaseVersionHeader>, BackendError> {
        Err(BackendError::Unsupported {
            operation: "database version headers",
        })
    }

    fn file_status(&self, _root: &Utf8Path, _file: &Utf8Path) -> Result<FileStatus, BackendError> {
        Err(BackendError::Unsupported {
            operation: "file status",
        })
    }
}

/// Answers every request posted on the daemon bus.
pub struct RequestService {
    bus: Arc<EventBus>,
    roots: Vec<Utf8PathBuf>,
    backend: Arc<dyn HistoryBackend>,
    statuses: Mutex<HashMap<Utf8PathBuf, WatchStatus>>,
}

impl RequestService {
    /// Builds a service for the enabled folders of `descriptor`.
    #[must_use]
    pub fn new(
        bus: Arc<EventBus>,
        descriptor: &DaemonDescriptor,
        backend: Arc<dyn HistoryBackend>,
    ) -> Self {
        Self {
            bus,
            roots: descriptor.enabled_folders().map(Utf8Path::to_owned).collect(),
            backend,
            statuses: Mutex::new(HashMap::new()),
        }
    }

    /// Builds the response to `request`.
    #[must_use]
    pub fn answer(&self, request: &Request) -> Response {
        let id = request.id;
        let outcome = match &request.body {
            RequestBody::ListWatches => Ok(Ok(ResponseBody::ListWatches {
                watches: self.watches(),
            })),
            RequestBody::LsFolder { root, options } => self
                .watched(root)
                .map(|root| self.backend.ls_folder(root, options))
                .map(|result| result.map(|result| ResponseBody::LsFolder { result })),
            RequestBody::LogFolder { root, options } => self
                .watched(root)
                .map(|root| self.backend.log_folder(root, options))
                .map(|result| {
                    result.map(|database_versions| ResponseBody::LogFolder { database_versions })
                }),
            RequestBody::GetDatabaseVersionHeaders { root } => self
                .watched(root)
                .map(|root| self.backend.database_version_headers(root))
                .map(|result| {
                    result.map(|database_version_headers| {
                        ResponseBody::GetDatabaseVersionHeaders {
                            root: root.clone(),
                            database_version_headers,
                        }
                    })
                }),
            RequestBody::RetrieveFileStatus { file } => self
                .containing_root(file)
                .map(|root| self.backend.file_status(root, file))
                .map(|result| {
                    result.map(|status| ResponseBody::RetrieveFileStatus {
                        file: file.clone(),
                        status,
                    })
                }),
        };
        match outcome {
            Err(path) => Response::bad_request(
                id,
                STATUS_BAD_REQUEST,
                format!("{path} is not inside a watched folder"),
            ),
            Ok(Ok(body)) => Response::ok(id, body),
            Ok(Err(error)) => {
                let code = match error {
                    BackendError::Unsupported { .. } => STATUS_NOT_IMPLEMENTED,
                    BackendError::Failed { .. } => STATUS_INTERNAL_ERROR,
                };
                warn!(target: SERVICE_TARGET, request_id = %id, code, %error, "request failed");
                Response::bad_request(id, code, error.to_string())
            }
        }
    }

    fn watches(&self) -> Vec<Watch> {
        let statuses = self.statuses.lock().unwrap_or_else(PoisonError::into_inner);
        self.roots
            .iter()
            .map(|root| Watch {
                status: statuses.get(root).copied(),
                ..Watch::new(root.clone())
            })
            .collect()
    }

    fn track(&self, root: &Utf8Path, status: WatchStatus) {
        if self.watched(root).is_err() {
            return;
        }
        debug!(target: SERVICE_TARGET, %root, %status, "watch status changed");
        self.statuses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(root.to_owned(), status);
    }

    fn watched<'a>(&'a self, root: &'a Utf8Path) -> Result<&'a Utf8Path, &'a Utf8Path> {
        self.roots
            .iter()
            .find(|known| *known == root)
            .map(Utf8PathBuf::as_path)
            .ok_or(root)
    }

    fn containing_root<'a>(&'a self, file: &'a Utf8Path) -> Result<&'a Utf8Path, &'a Utf8Path> {
        self.roots
            .iter()
            .find(|known| file.starts_with(known))
            .map(Utf8PathBuf::as_path)
            .ok_or(file)
    }
}

impl Subscriber for RequestService {
    fn subscription(&self) -> Subscription {
        Subscription::kinds([MessageKind::Request])
            .with_type(MessageType::WatchStartSyncExternalEvent)
            .with_type(MessageType::WatchEndSyncExternalEvent)
    }

    fn on_message(&self, message: &Message) -> Result<(), DispatchError> {
        let request = match message {
            Message::Request(request) => request,
            Message::Event(Event::WatchStartSync { root }) => {
                self.track(root, WatchStatus::Syncing);
                return Ok(());
            }
            Message::Event(Event::WatchEndSync { root, .. }) => {
                self.track(root, WatchStatus::InSync);
                return Ok(());
            }
            _ => return Ok(()),
        };
        let response = self.answer(request);
        debug!(
            target: SERVICE_TARGET,
            request_id = %request.id,
            code = response.code,
            "answering request"
        );
        self.bus.post(&response.into());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use ferry_config::WatchedFolder;
    use ferry_messages::model::ChangeSet;
    use mockall::mock;
    use rstest::{fixture, rstest};

    use super::*;

    mock! {
        Backend {}
        impl HistoryBackend for Backend {
            fn ls_folder(&self, root: &Utf8Path, options: &LsOptions) -> Result<LsResult, BackendError>;
            fn log_folder(
                &self,
                root: &Utf8Path,
                options: &LogOptions,
            ) -> Result<Vec<LightweightDatabaseVersion>, BackendError>;
            fn database_version_headers(
                &self,
                root: &Utf8Path,
            ) -> Result<Vec<DatabaseVersionHeader>, BackendError>;
            fn file_status(&self, root: &Utf8Path, file: &Utf8Path) -> Result<FileStatus, BackendError>;
        }
    }

    #[fixture]
    fn descriptor() -> DaemonDescriptor {
        DaemonDescriptor {
            folders: vec![
                WatchedFolder {
                    path: "/home/alice/Sync".into(),
                    enabled: true,
                },
                WatchedFolder {
                    path: "/home/alice/Paused".into(),
                    enabled: false,
                },
            ],
            ..DaemonDescriptor::default()
        }
    }

    fn service(descriptor: &DaemonDescriptor, backend: MockBackend) -> RequestService {
        RequestService::new(
            Arc::new(EventBus::new("local")),
            descriptor,
            Arc::new(backend),
        )
    }

    #[rstest]
    fn watches_list_only_enabled_folders(descriptor: DaemonDescriptor) {
        let service = service(&descriptor, MockBackend::new());
        let response = service.answer(&Request::list_watches());

        assert!(response.is_success());
        assert_eq!(
            response.body,
            ResponseBody::ListWatches {
                watches: vec![Watch::new("/home/alice/Sync")]
            }
        );
    }

    #[rstest]
    fn watches_report_the_last_sync_status(descriptor: DaemonDescriptor) {
        let service = service(&descriptor, MockBackend::new());
        let start = Message::from(Event::WatchStartSync {
            root: "/home/alice/Sync".into(),
        });
        service.on_message(&start).expect("start event");
        service
            .on_message(&Message::from(Event::WatchStartSync {
                root: "/home/alice/Paused".into(),
            }))
            .expect("unwatched start event");

        let syncing = service.answer(&Request::list_watches());
        let ResponseBody::ListWatches { watches } = syncing.body else {
            panic!("expected a watch list");
        };
        assert_eq!(watches.len(), 1);
        assert!(
            watches
                .iter()
                .all(|watch| watch.status == Some(WatchStatus::Syncing))
        );

        let end = Message::from(Event::WatchEndSync {
            root: "/home/alice/Sync".into(),
            date: time::OffsetDateTime::UNIX_EPOCH,
            change_set: ChangeSet::default(),
        });
        service.on_message(&end).expect("end event");
        let synced = service.answer(&Request::list_watches());
        let ResponseBody::ListWatches { watches } = synced.body else {
            panic!("expected a watch list");
        };
        assert!(
            watches
                .iter()
                .all(|watch| watch.status == Some(WatchStatus::InSync))
        );
    }

    #[rstest]
    fn unwatched_roots_are_bad_requests(descriptor: DaemonDescriptor) {
        let mut backend = MockBackend::new();
        backend.expect_ls_folder().never();
        let service = service(&descriptor, backend);

        let request = Request::ls_folder("/home/alice/Paused", LsOptions::default());
        let response = service.answer(&request);

        assert_eq!(response.code, STATUS_BAD_REQUEST);
        assert_eq!(response.request_id, request.id);
        assert_eq!(response.body, ResponseBody::BadRequest);
    }

    #[rstest]
    fn listings_are_delegated_to_the_backend(descriptor: DaemonDescriptor) {
        let mut backend = MockBackend::new();
        backend
            .expect_ls_folder()
            .withf(|root, options| {
                root == Utf8Path::new("/home/alice/Sync") && options.path_expression == "docs/"
            })
            .once()
            .returning(|_, _| Ok(LsResult::default()));
        let service = service(&descriptor, backend);

        let response = service.answer(&Request::ls_folder(
            "/home/alice/Sync",
            LsOptions::children_of("docs/", None),
        ));

        assert!(response.is_success());
        assert!(matches!(response.body, ResponseBody::LsFolder { .. }));
    }

    #[rstest]
    fn file_status_is_resolved_against_the_containing_root(descriptor: DaemonDescriptor) {
        let mut backend = MockBackend::new();
        backend
            .expect_file_status()
            .withf(|root, file| {
                root == Utf8Path::new("/home/alice/Sync")
                    && file == Utf8Path::new("/home/alice/Sync/a.txt")
            })
            .once()
            .returning(|_, _| Ok(FileStatus::Ok));
        let service = service(&descriptor, backend);

        let response = service.answer(&Request::file_status("/home/alice/Sync/a.txt"));

        assert_eq!(
            response.body,
            ResponseBody::RetrieveFileStatus {
                file: "/home/alice/Sync/a.txt".into(),
                status: FileStatus::Ok,
            }
        );
    }

    #[rstest]
    #[case(
        BackendError::Failed { operation: "change log", message: "database locked".to_owned() },
        STATUS_INTERNAL_ERROR
    )]
    #[case(BackendError::Unsupported { operation: "change log" }, STATUS_NOT_IMPLEMENTED)]
    fn backend_failures_map_to_status_codes(
        descriptor: DaemonDescriptor,
        #[case] error: BackendError,
        #[case] code: u16,
    ) {
        let mut backend = MockBackend::new();
        let mut error = Some(error);
        backend
            .expect_log_folder()
            .once()
            .returning(move |_, _| Err(error.take().expect("single call")));
        let service = service(&descriptor, backend);

        let response = service.answer(&Request::log_folder("/home/alice/Sync", LogOptions::page(0)));

        assert_eq!(response.code, code);
        assert!(response.message.is_some());
    }

    #[rstest]
    fn the_default_backend_answers_not_implemented(descriptor: DaemonDescriptor) {
        let service = RequestService::new(
            Arc::new(EventBus::new("local")),
            &descriptor,
            Arc::new(UnimplementedBackend),
        );
        let response = service.answer(&Request::database_version_headers("/home/alice/Sync"));
        assert_eq!(response.code, STATUS_NOT_IMPLEMENTED);
    }
}
