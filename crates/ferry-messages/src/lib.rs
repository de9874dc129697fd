//! Message model and wire codec shared by the Ferry client and daemon.
//!
//! Every exchange between a client and the daemon is a [`Message`] with one
//! of four capabilities: a [`Request`] that expects exactly one
//! [`Response`], a fire-and-forget [`Event`], or an [`EventResponse`] that
//! answers an interactive event. Requests receive a process-unique
//! [`RequestId`] when they are constructed; responses echo it as
//! `requestId`.
//!
//! On the wire each message is a single JSON object whose `type` member names
//! the concrete variant (for example `LsFolderRequest`). [`encode`] and
//! [`decode`] convert between the two representations.
//!
//! The file-history data model carried by listing and log responses lives in
//! [`model`].

mod codec;
mod id;
mod message;
pub mod model;

pub use codec::{DeserializationError, SerializationError, decode, encode};
pub use id::RequestId;
pub use message::{
    Event, EventResponse, Message, MessageKind, MessageType, Request, RequestBody, Response,
    ResponseBody, STATUS_BAD_REQUEST, STATUS_INTERNAL_ERROR, STATUS_NOT_IMPLEMENTED, STATUS_OK,
};
