//! Synchronous publish/subscribe router.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::sync::{Arc, PoisonError, RwLock};

use ferry_messages::Message;
use tracing::{debug, error, warn};

use crate::BUS_TARGET;
use crate::subscriber::{Subscriber, Subscription};

#[derive(Clone)]
struct Registration {
    subscriber: Arc<dyn Subscriber>,
    subscription: Subscription,
}

/// Routes messages to registered subscribers on the posting thread.
///
/// Registration swaps in a new subscriber list, so `post` iterates a snapshot
/// and handlers may post, register or unregister re-entrantly.
pub struct EventBus {
    name: String,
    registry: RwLock<Arc<Vec<Registration>>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("EventBus")
            .field("name", &self.name)
            .field("subscribers", &self.snapshot().len())
            .finish()
    }
}

impl EventBus {
    /// Creates an empty bus; `name` appears in log records.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            registry: RwLock::new(Arc::new(Vec::new())),
        }
    }

    /// Name used in log records.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Adds a subscriber. Returns `false` when the same instance is already
    /// registered, in which case nothing changes.
    pub fn register(&self, subscriber: Arc<dyn Subscriber>) -> bool {
        let mut registry = self
            .registry
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if registry
            .iter()
            .any(|entry| same_instance(&entry.subscriber, &subscriber))
        {
            debug!(target: BUS_TARGET, bus = %self.name, "subscriber already registered");
            return false;
        }
        let mut next = registry.as_ref().clone();
        next.push(Registration {
            subscription: subscriber.subscription(),
            subscriber,
        });
        *registry = Arc::new(next);
        true
    }

    /// Removes a subscriber. Deliveries already in progress still complete.
    pub fn unregister(&self, subscriber: &Arc<dyn Subscriber>) -> bool {
        let mut registry = self
            .registry
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = registry.len();
        let next: Vec<_> = registry
            .iter()
            .filter(|entry| !same_instance(&entry.subscriber, subscriber))
            .cloned()
            .collect();
        let removed = next.len() != before;
        *registry = Arc::new(next);
        removed
    }

    /// Number of registered subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.snapshot().len()
    }

    /// Delivers `message` to every matching subscriber in registration order
    /// and returns how many handled it without failing.
    pub fn post(&self, message: &Message) -> usize {
        let snapshot = self.snapshot();
        let message_type = message.message_type();
        let mut delivered = 0;
        for entry in snapshot
            .iter()
            .filter(|entry| entry.subscription.matches(message))
        {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                entry.subscriber.on_message(message)
            }));
            match outcome {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(dispatch_error)) => warn!(
                    target: BUS_TARGET,
                    bus = %self.name,
                    message_type = %message_type,
                    error = %dispatch_error,
                    "subscriber failed to handle message"
                ),
                Err(payload) => error!(
                    target: BUS_TARGET,
                    bus = %self.name,
                    message_type = %message_type,
                    panic = panic_message(payload.as_ref()),
                    "subscriber panicked while handling message"
                ),
            }
        }
        delivered
    }

    fn snapshot(&self) -> Arc<Vec<Registration>> {
        Arc::clone(
            &self
                .registry
                .read()
                .unwrap_or_else(PoisonError::into_inner),
        )
    }
}

fn same_instance(left: &Arc<dyn Subscriber>, right: &Arc<dyn Subscriber>) -> bool {
    ptr::addr_eq(Arc::as_ptr(left), Arc::as_ptr(right))
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
