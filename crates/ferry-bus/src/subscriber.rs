//! Handler contract for bus deliveries.

use std::error::Error;

use ferry_messages::{Message, MessageKind, MessageType};
use thiserror::Error;

/// Receives messages posted to an [`EventBus`](crate::EventBus).
pub trait Subscriber: Send + Sync {
    /// Messages this subscriber wants; read once at registration.
    fn subscription(&self) -> Subscription;

    /// Handles one delivery. Errors are logged by the bus and go no further.
    fn on_message(&self, message: &Message) -> Result<(), DispatchError>;
}

/// Set of capability classes and exact message types.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Subscription {
    kinds: Vec<MessageKind>,
    types: Vec<MessageType>,
}

impl Subscription {
    /// Matches every message of the given capability classes.
    #[must_use]
    pub fn kinds(kinds: impl IntoIterator<Item = MessageKind>) -> Self {
        Self {
            kinds: kinds.into_iter().collect(),
            types: Vec::new(),
        }
    }

    /// Matches exactly the given message types.
    #[must_use]
    pub fn types(types: impl IntoIterator<Item = MessageType>) -> Self {
        Self {
            kinds: Vec::new(),
            types: types.into_iter().collect(),
        }
    }

    /// Adds a capability class.
    #[must_use]
    pub fn with_kind(mut self, kind: MessageKind) -> Self {
        self.kinds.push(kind);
        self
    }

    /// Adds an exact message type.
    #[must_use]
    pub fn with_type(mut self, message_type: MessageType) -> Self {
        self.types.push(message_type);
        self
    }

    /// Whether a message falls under this subscription.
    #[must_use]
    pub fn matches(&self, message: &Message) -> bool {
        let message_type = message.message_type();
        self.types.contains(&message_type) || self.kinds.contains(&message_type.kind())
    }
}

/// Failure reported by a subscriber.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The subscriber declined the message.
    #[error("{0}")]
    Rejected(String),
    /// The subscriber failed while acting on the message.
    #[error("{context}: {source}")]
    Failed {
        /// What the subscriber was doing.
        context: String,
        /// Underlying failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
}

impl DispatchError {
    /// Builds a [`DispatchError::Rejected`].
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected(reason.into())
    }

    /// Wraps an underlying error with context.
    pub fn failed(context: impl Into<String>, source: impl Into<Box<dyn Error + Send + Sync>>) -> Self {
        Self::Failed {
            context: context.into(),
            source: source.into(),
        }
    }
}
