//! JSON text framing of messages.

use serde_json::Value;
use thiserror::Error;

use crate::message::{Event, EventResponse, Message, MessageKind, MessageType, Request, Response};

const TYPE_FIELD: &str = "type";

/// Raised when a message cannot be rendered as JSON.
#[derive(Debug, Error)]
#[error("failed to serialise {message_type}: {source}")]
pub struct SerializationError {
    message_type: MessageType,
    #[source]
    source: serde_json::Error,
}

impl SerializationError {
    /// Variant that failed to serialise.
    #[must_use]
    pub const fn message_type(&self) -> MessageType {
        self.message_type
    }
}

/// Raised when a frame does not describe a known, well-formed message.
#[derive(Debug, Error)]
pub enum DeserializationError {
    /// The frame is not a JSON object.
    #[error("frame is not valid JSON: {source}")]
    Syntax {
        /// Parser error.
        #[source]
        source: serde_json::Error,
    },
    /// The frame has no string `type` member.
    #[error("frame has no type tag")]
    MissingType,
    /// The type tag names no known variant.
    #[error("unknown message type '{tag}'")]
    UnknownType {
        /// Tag found in the frame.
        tag: String,
    },
    /// The payload does not match the variant's shape.
    #[error("malformed {message_type} payload: {source}")]
    Malformed {
        /// Variant named by the tag.
        message_type: MessageType,
        /// Decoder error.
        #[source]
        source: serde_json::Error,
    },
}

/// Renders a message as one JSON text frame.
pub fn encode(message: &Message) -> Result<String, SerializationError> {
    let rendered = match message {
        Message::Request(request) => serde_json::to_string(request),
        Message::Response(response) => serde_json::to_string(response),
        Message::Event(event) => serde_json::to_string(event),
        Message::EventResponse(response) => serde_json::to_string(response),
    };
    rendered.map_err(|source| SerializationError {
        message_type: message.message_type(),
        source,
    })
}

/// Parses one JSON text frame.
pub fn decode(frame: &str) -> Result<Message, DeserializationError> {
    let value: Value =
        serde_json::from_str(frame).map_err(|source| DeserializationError::Syntax { source })?;
    let tag = value
        .get(TYPE_FIELD)
        .and_then(Value::as_str)
        .ok_or(DeserializationError::MissingType)?;
    let message_type =
        tag.parse::<MessageType>()
            .map_err(|_| DeserializationError::UnknownType {
                tag: tag.to_owned(),
            })?;

    let malformed = |source| DeserializationError::Malformed {
        message_type,
        source,
    };
    match message_type.kind() {
        MessageKind::Request => serde_json::from_value::<Request>(value)
            .map(Message::Request)
            .map_err(malformed),
        MessageKind::Response => serde_json::from_value::<Response>(value)
            .map(Message::Response)
            .map_err(malformed),
        MessageKind::Event => serde_json::from_value::<Event>(value)
            .map(Message::Event)
            .map_err(malformed),
        MessageKind::EventResponse => serde_json::from_value::<EventResponse>(value)
            .map(Message::EventResponse)
            .map_err(malformed),
    }
}
