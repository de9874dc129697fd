//! Message variants exchanged between clients and the daemon.

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};
use time::OffsetDateTime;

use crate::id::RequestId;
use crate::model::{
    ChangeSet, DatabaseVersionHeader, FileStatus, LightweightDatabaseVersion, LogOptions,
    LsOptions, LsResult, Watch,
};

/// Status code of a successful response.
pub const STATUS_OK: u16 = 200;
/// Status code of a request the daemon cannot serve as asked.
pub const STATUS_BAD_REQUEST: u16 = 400;
/// Status code of a request that failed inside the daemon.
pub const STATUS_INTERNAL_ERROR: u16 = 500;
/// Status code of a request the daemon has no implementation for.
pub const STATUS_NOT_IMPLEMENTED: u16 = 501;

/// Capability class of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum MessageKind {
    /// Expects exactly one response.
    Request,
    /// Answers one request.
    Response,
    /// Fire-and-forget notification.
    Event,
    /// Answer to an interactive event.
    EventResponse,
}

/// Concrete message variant, named by its wire type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
pub enum MessageType {
    /// [`RequestBody::ListWatches`].
    ListWatchesManagementRequest,
    /// [`RequestBody::LsFolder`].
    LsFolderRequest,
    /// [`RequestBody::LogFolder`].
    LogFolderRequest,
    /// [`RequestBody::GetDatabaseVersionHeaders`].
    GetDatabaseVersionHeadersFolderRequest,
    /// [`RequestBody::RetrieveFileStatus`].
    RetrieveFileStatusManagementRequest,
    /// [`ResponseBody::ListWatches`].
    ListWatchesManagementResponse,
    /// [`ResponseBody::LsFolder`].
    LsFolderResponse,
    /// [`ResponseBody::LogFolder`].
    LogFolderResponse,
    /// [`ResponseBody::GetDatabaseVersionHeaders`].
    GetDatabaseVersionHeadersFolderResponse,
    /// [`ResponseBody::RetrieveFileStatus`].
    RetrieveFileStatusManagementResponse,
    /// [`ResponseBody::BadRequest`].
    BadRequestResponse,
    /// [`Event::WatchStartSync`].
    WatchStartSyncExternalEvent,
    /// [`Event::WatchEndSync`].
    WatchEndSyncExternalEvent,
    /// [`Event::ConfirmUserInteraction`].
    ConfirmUserInteractionExternalEvent,
    /// [`Event::UpdateRecentChanges`].
    UpdateRecentChangesEvent,
    /// [`EventResponse::ConfirmUserInteraction`].
    ConfirmUserInteractionExternalEventResponse,
}

impl MessageType {
    /// Capability class of the variant.
    #[must_use]
    pub const fn kind(self) -> MessageKind {
        match self {
            Self::ListWatchesManagementRequest
            | Self::LsFolderRequest
            | Self::LogFolderRequest
            | Self::GetDatabaseVersionHeadersFolderRequest
            | Self::RetrieveFileStatusManagementRequest => MessageKind::Request,
            Self::ListWatchesManagementResponse
            | Self::LsFolderResponse
            | Self::LogFolderResponse
            | Self::GetDatabaseVersionHeadersFolderResponse
            | Self::RetrieveFileStatusManagementResponse
            | Self::BadRequestResponse => MessageKind::Response,
            Self::WatchStartSyncExternalEvent
            | Self::WatchEndSyncExternalEvent
            | Self::ConfirmUserInteractionExternalEvent
            | Self::UpdateRecentChangesEvent => MessageKind::Event,
            Self::ConfirmUserInteractionExternalEventResponse => MessageKind::EventResponse,
        }
    }

    /// Wire type tag.
    #[must_use]
    pub fn tag(self) -> &'static str {
        self.into()
    }
}

/// Any message carried by a bus or the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// See [`Request`].
    Request(Request),
    /// See [`Response`].
    Response(Response),
    /// See [`Event`].
    Event(Event),
    /// See [`EventResponse`].
    EventResponse(EventResponse),
}

impl Message {
    /// Capability class of the message.
    #[must_use]
    pub const fn kind(&self) -> MessageKind {
        self.message_type().kind()
    }

    /// Concrete variant of the message.
    #[must_use]
    pub const fn message_type(&self) -> MessageType {
        match self {
            Self::Request(request) => request.body.message_type(),
            Self::Response(response) => response.body.message_type(),
            Self::Event(event) => event.message_type(),
            Self::EventResponse(response) => response.message_type(),
        }
    }
}

impl From<Request> for Message {
    fn from(request: Request) -> Self {
        Self::Request(request)
    }
}

impl From<Response> for Message {
    fn from(response: Response) -> Self {
        Self::Response(response)
    }
}

impl From<Event> for Message {
    fn from(event: Event) -> Self {
        Self::Event(event)
    }
}

impl From<EventResponse> for Message {
    fn from(response: EventResponse) -> Self {
        Self::EventResponse(response)
    }
}

/// A message expecting exactly one [`Response`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// Correlation id, echoed by the response.
    pub id: RequestId,
    /// Variant payload.
    #[serde(flatten)]
    pub body: RequestBody,
}

impl Request {
    /// Builds a request with a freshly allocated id.
    #[must_use]
    pub fn new(body: RequestBody) -> Self {
        Self {
            id: RequestId::next(),
            body,
        }
    }

    /// Copy of this request carrying a different id.
    #[must_use]
    pub fn relabelled(&self, id: RequestId) -> Self {
        Self {
            id,
            body: self.body.clone(),
        }
    }

    /// Asks the daemon for its watched roots.
    #[must_use]
    pub fn list_watches() -> Self {
        Self::new(RequestBody::ListWatches)
    }

    /// Lists entries of `root`.
    #[must_use]
    pub fn ls_folder(root: impl Into<Utf8PathBuf>, options: LsOptions) -> Self {
        Self::new(RequestBody::LsFolder {
            root: root.into(),
            options,
        })
    }

    /// Fetches one page of the change log of `root`.
    #[must_use]
    pub fn log_folder(root: impl Into<Utf8PathBuf>, options: LogOptions) -> Self {
        Self::new(RequestBody::LogFolder {
            root: root.into(),
            options,
        })
    }

    /// Fetches every database version header of `root`.
    #[must_use]
    pub fn database_version_headers(root: impl Into<Utf8PathBuf>) -> Self {
        Self::new(RequestBody::GetDatabaseVersionHeaders { root: root.into() })
    }

    /// Asks for the sync status of one local file.
    #[must_use]
    pub fn file_status(file: impl Into<Utf8PathBuf>) -> Self {
        Self::new(RequestBody::RetrieveFileStatus { file: file.into() })
    }
}

/// Request payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum RequestBody {
    /// Watched roots known to the daemon.
    #[serde(rename = "ListWatchesManagementRequest")]
    ListWatches,
    /// Folder listing within a root.
    #[serde(rename = "LsFolderRequest")]
    LsFolder {
        /// Watched root.
        root: Utf8PathBuf,
        /// Listing parameters.
        options: LsOptions,
    },
    /// Change log page within a root.
    #[serde(rename = "LogFolderRequest")]
    LogFolder {
        /// Watched root.
        root: Utf8PathBuf,
        /// Paging parameters.
        options: LogOptions,
    },
    /// Database version headers of a root, oldest first.
    #[serde(rename = "GetDatabaseVersionHeadersFolderRequest")]
    GetDatabaseVersionHeaders {
        /// Watched root.
        root: Utf8PathBuf,
    },
    /// Sync status of one file.
    #[serde(rename = "RetrieveFileStatusManagementRequest")]
    RetrieveFileStatus {
        /// Absolute path of the file.
        file: Utf8PathBuf,
    },
}

impl RequestBody {
    /// Concrete variant.
    #[must_use]
    pub const fn message_type(&self) -> MessageType {
        match self {
            Self::ListWatches => MessageType::ListWatchesManagementRequest,
            Self::LsFolder { .. } => MessageType::LsFolderRequest,
            Self::LogFolder { .. } => MessageType::LogFolderRequest,
            Self::GetDatabaseVersionHeaders { .. } => {
                MessageType::GetDatabaseVersionHeadersFolderRequest
            }
            Self::RetrieveFileStatus { .. } => MessageType::RetrieveFileStatusManagementRequest,
        }
    }

    /// Watched root the request is scoped to, if any.
    #[must_use]
    pub const fn root(&self) -> Option<&Utf8PathBuf> {
        match self {
            Self::LsFolder { root, .. }
            | Self::LogFolder { root, .. }
            | Self::GetDatabaseVersionHeaders { root } => Some(root),
            Self::ListWatches | Self::RetrieveFileStatus { .. } => None,
        }
    }
}

/// Answer to one [`Request`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    /// HTTP-style status code.
    pub code: u16,
    /// Id of the request being answered.
    pub request_id: RequestId,
    /// Human-readable detail, usually for failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Variant payload.
    #[serde(flatten)]
    pub body: ResponseBody,
}

impl Response {
    /// Builds a response from its parts.
    #[must_use]
    pub const fn new(
        code: u16,
        request_id: RequestId,
        message: Option<String>,
        body: ResponseBody,
    ) -> Self {
        Self {
            code,
            request_id,
            message,
            body,
        }
    }

    /// Successful response to `request_id`.
    #[must_use]
    pub const fn ok(request_id: RequestId, body: ResponseBody) -> Self {
        Self::new(STATUS_OK, request_id, None, body)
    }

    /// Failure response to `request_id`.
    #[must_use]
    pub fn bad_request(request_id: RequestId, code: u16, message: impl Into<String>) -> Self {
        Self::new(
            code,
            request_id,
            Some(message.into()),
            ResponseBody::BadRequest,
        )
    }

    /// Copy of this response answering a different id.
    #[must_use]
    pub fn relabelled(&self, request_id: RequestId) -> Self {
        Self {
            request_id,
            ..self.clone()
        }
    }

    /// Whether the code is in the 2xx family.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code >= 200 && self.code < 300
    }
}

/// Response payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum ResponseBody {
    /// Watched roots.
    #[serde(rename = "ListWatchesManagementResponse")]
    ListWatches {
        /// Roots in daemon order.
        watches: Vec<Watch>,
    },
    /// Folder listing.
    #[serde(rename = "LsFolderResponse")]
    LsFolder {
        /// Matching entries.
        result: LsResult,
    },
    /// Change log page, newest first.
    #[serde(rename = "LogFolderResponse")]
    LogFolder {
        /// Database versions of the page.
        database_versions: Vec<LightweightDatabaseVersion>,
    },
    /// Database version headers.
    #[serde(rename = "GetDatabaseVersionHeadersFolderResponse")]
    GetDatabaseVersionHeaders {
        /// Root the headers belong to.
        root: Utf8PathBuf,
        /// Headers, oldest first.
        database_version_headers: Vec<DatabaseVersionHeader>,
    },
    /// Sync status of one file.
    #[serde(rename = "RetrieveFileStatusManagementResponse")]
    RetrieveFileStatus {
        /// File the status belongs to.
        file: Utf8PathBuf,
        /// Current status.
        status: FileStatus,
    },
    /// Failure; details are in the code and message.
    #[serde(rename = "BadRequestResponse")]
    BadRequest,
}

impl ResponseBody {
    /// Concrete variant.
    #[must_use]
    pub const fn message_type(&self) -> MessageType {
        match self {
            Self::ListWatches { .. } => MessageType::ListWatchesManagementResponse,
            Self::LsFolder { .. } => MessageType::LsFolderResponse,
            Self::LogFolder { .. } => MessageType::LogFolderResponse,
            Self::GetDatabaseVersionHeaders { .. } => {
                MessageType::GetDatabaseVersionHeadersFolderResponse
            }
            Self::RetrieveFileStatus { .. } => MessageType::RetrieveFileStatusManagementResponse,
            Self::BadRequest => MessageType::BadRequestResponse,
        }
    }
}

/// Fire-and-forget notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum Event {
    /// The daemon began synchronising a root.
    #[serde(rename = "WatchStartSyncExternalEvent")]
    WatchStartSync {
        /// Watched root.
        root: Utf8PathBuf,
    },
    /// The daemon finished synchronising a root.
    #[serde(rename = "WatchEndSyncExternalEvent")]
    WatchEndSync {
        /// Watched root.
        root: Utf8PathBuf,
        /// Completion time.
        #[serde(with = "time::serde::rfc3339")]
        date: OffsetDateTime,
        /// Paths touched by the run.
        change_set: ChangeSet,
    },
    /// The daemon needs the user to confirm an action.
    #[serde(rename = "ConfirmUserInteractionExternalEvent")]
    ConfirmUserInteraction {
        /// Dialog title.
        header: String,
        /// Explanation shown to the user.
        message: String,
        /// Yes/no question.
        question: String,
    },
    /// The recent-changes list was updated.
    #[serde(rename = "UpdateRecentChangesEvent")]
    UpdateRecentChanges {
        /// Absolute paths, newest first.
        recent_changes: Vec<Utf8PathBuf>,
    },
}

impl Event {
    /// Concrete variant.
    #[must_use]
    pub const fn message_type(&self) -> MessageType {
        match self {
            Self::WatchStartSync { .. } => MessageType::WatchStartSyncExternalEvent,
            Self::WatchEndSync { .. } => MessageType::WatchEndSyncExternalEvent,
            Self::ConfirmUserInteraction { .. } => MessageType::ConfirmUserInteractionExternalEvent,
            Self::UpdateRecentChanges { .. } => MessageType::UpdateRecentChangesEvent,
        }
    }
}

/// Answers to interactive events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum EventResponse {
    /// The user's answer to [`Event::ConfirmUserInteraction`].
    #[serde(rename = "ConfirmUserInteractionExternalEventResponse")]
    ConfirmUserInteraction {
        /// Whether the user agreed.
        result: bool,
    },
}

impl EventResponse {
    /// Concrete variant.
    #[must_use]
    pub const fn message_type(&self) -> MessageType {
        match self {
            Self::ConfirmUserInteraction { .. } => {
                MessageType::ConfirmUserInteractionExternalEventResponse
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn requests_receive_distinct_ids_at_construction() {
        let first = Request::list_watches();
        let second = Request::list_watches();
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn relabelled_request_keeps_payload() {
        let request = Request::database_version_headers("/home/alice/Sync");
        let relabelled = request.relabelled(RequestId::new(7));
        assert_eq!(relabelled.id, RequestId::new(7));
        assert_eq!(relabelled.body, request.body);
    }

    #[test]
    fn bad_request_carries_code_and_message() {
        let response = Response::bad_request(RequestId::new(3), STATUS_BAD_REQUEST, "no such root");
        assert_eq!(response.code, 400);
        assert_eq!(response.message.as_deref(), Some("no such root"));
        assert!(!response.is_success());
        assert_eq!(
            Message::from(response).message_type(),
            MessageType::BadRequestResponse
        );
    }

    #[rstest]
    #[case(MessageType::LsFolderRequest, MessageKind::Request)]
    #[case(MessageType::BadRequestResponse, MessageKind::Response)]
    #[case(MessageType::UpdateRecentChangesEvent, MessageKind::Event)]
    #[case(
        MessageType::ConfirmUserInteractionExternalEventResponse,
        MessageKind::EventResponse
    )]
    fn message_types_belong_to_one_capability(
        #[case] message_type: MessageType,
        #[case] kind: MessageKind,
    ) {
        assert_eq!(message_type.kind(), kind);
    }

    #[test]
    fn type_tags_parse_back_to_message_types() {
        let tag = MessageType::GetDatabaseVersionHeadersFolderResponse.tag();
        assert_eq!(tag, "GetDatabaseVersionHeadersFolderResponse");
        assert_eq!(
            tag.parse::<MessageType>().ok(),
            Some(MessageType::GetDatabaseVersionHeadersFolderResponse)
        );
    }
}
