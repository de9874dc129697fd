//! Forwarding between the client bus and the daemon bus.

use std::sync::{Arc, Weak};

use ferry_messages::{Message, MessageKind};
use tracing::{debug, info};

use crate::BUS_TARGET;
use crate::bus::EventBus;
use crate::subscriber::{DispatchError, Subscriber, Subscription};

/// Re-posts one set of capability classes onto another bus.
struct Forwarder {
    kinds: [MessageKind; 2],
    target: Weak<EventBus>,
}

impl Subscriber for Forwarder {
    fn subscription(&self) -> Subscription {
        Subscription::kinds(self.kinds)
    }

    fn on_message(&self, message: &Message) -> Result<(), DispatchError> {
        let target = self
            .target
            .upgrade()
            .ok_or_else(|| DispatchError::rejected("bridge target bus was dropped"))?;
        debug!(
            target: BUS_TARGET,
            to = target.name(),
            message_type = %message.message_type(),
            "bridging message"
        );
        target.post(message);
        Ok(())
    }
}

/// Joins a client-side ("gui") bus to a daemon-side ("local") bus.
///
/// Requests and event responses posted on the gui bus are re-posted on the
/// local bus; responses and events posted on the local bus are re-posted on
/// the gui bus. Neither forwarder consumes what the other emits, so a message
/// crosses at most once.
pub struct BusBridge {
    gui: Arc<EventBus>,
    local: Arc<EventBus>,
    gui_listener: Arc<dyn Subscriber>,
    local_listener: Arc<dyn Subscriber>,
}

impl BusBridge {
    /// Builds a bridge; nothing is forwarded until [`Self::start`].
    #[must_use]
    pub fn new(gui: Arc<EventBus>, local: Arc<EventBus>) -> Self {
        let gui_listener: Arc<dyn Subscriber> = Arc::new(Forwarder {
            kinds: [MessageKind::Request, MessageKind::EventResponse],
            target: Arc::downgrade(&local),
        });
        let local_listener: Arc<dyn Subscriber> = Arc::new(Forwarder {
            kinds: [MessageKind::Response, MessageKind::Event],
            target: Arc::downgrade(&gui),
        });
        Self {
            gui,
            local,
            gui_listener,
            local_listener,
        }
    }

    /// Registers both forwarders. Starting twice has no further effect.
    pub fn start(&self) {
        let gui = self.gui.register(Arc::clone(&self.gui_listener));
        let local = self.local.register(Arc::clone(&self.local_listener));
        if gui || local {
            info!(
                target: BUS_TARGET,
                gui = self.gui.name(),
                local = self.local.name(),
                "bus bridge started"
            );
        }
    }

    /// Unregisters both forwarders.
    pub fn stop(&self) {
        self.gui.unregister(&self.gui_listener);
        self.local.unregister(&self.local_listener);
    }
}

impl Drop for BusBridge {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use ferry_messages::{Event, EventResponse, MessageType, Request, RequestId, Response, ResponseBody};
    use rstest::{fixture, rstest};

    use super::*;

    /// Records every message type delivered to it.
    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<MessageType>>,
    }

    impl Recorder {
        fn seen(&self) -> Vec<MessageType> {
            self.seen.lock().expect("recorder lock").clone()
        }
    }

    impl Subscriber for Recorder {
        fn subscription(&self) -> Subscription {
            Subscription::kinds([
                MessageKind::Request,
                MessageKind::Response,
                MessageKind::Event,
                MessageKind::EventResponse,
            ])
        }

        fn on_message(&self, message: &Message) -> Result<(), DispatchError> {
            self.seen
                .lock()
                .expect("recorder lock")
                .push(message.message_type());
            Ok(())
        }
    }

    struct Harness {
        gui: Arc<EventBus>,
        local: Arc<EventBus>,
        bridge: BusBridge,
        gui_recorder: Arc<Recorder>,
        local_recorder: Arc<Recorder>,
    }

    #[fixture]
    fn harness() -> Harness {
        let gui = Arc::new(EventBus::new("gui"));
        let local = Arc::new(EventBus::new("local"));
        let gui_recorder = Arc::new(Recorder::default());
        let local_recorder = Arc::new(Recorder::default());
        gui.register(gui_recorder.clone());
        local.register(local_recorder.clone());
        let bridge = BusBridge::new(Arc::clone(&gui), Arc::clone(&local));
        bridge.start();
        Harness {
            gui,
            local,
            bridge,
            gui_recorder,
            local_recorder,
        }
    }

    #[rstest]
    fn requests_cross_from_gui_to_local_once(harness: Harness) {
        harness.gui.post(&Request::list_watches().into());
        assert_eq!(
            harness.local_recorder.seen(),
            [MessageType::ListWatchesManagementRequest]
        );
        assert_eq!(
            harness.gui_recorder.seen(),
            [MessageType::ListWatchesManagementRequest]
        );
    }

    #[rstest]
    fn responses_and_events_cross_from_local_to_gui_once(harness: Harness) {
        let response = Response::ok(RequestId::new(1), ResponseBody::ListWatches { watches: vec![] });
        harness.local.post(&response.into());
        harness
            .local
            .post(&Event::WatchStartSync { root: "/r".into() }.into());
        assert_eq!(
            harness.gui_recorder.seen(),
            [
                MessageType::ListWatchesManagementResponse,
                MessageType::WatchStartSyncExternalEvent
            ]
        );
        assert_eq!(harness.local_recorder.seen().len(), 2);
    }

    #[rstest]
    fn event_responses_cross_from_gui_to_local(harness: Harness) {
        harness
            .gui
            .post(&EventResponse::ConfirmUserInteraction { result: false }.into());
        assert_eq!(
            harness.local_recorder.seen(),
            [MessageType::ConfirmUserInteractionExternalEventResponse]
        );
    }

    #[rstest]
    fn responses_posted_on_gui_stay_on_gui(harness: Harness) {
        let response = Response::ok(RequestId::new(2), ResponseBody::ListWatches { watches: vec![] });
        harness.gui.post(&response.into());
        assert!(harness.local_recorder.seen().is_empty());
    }

    #[rstest]
    fn stopped_bridge_forwards_nothing(harness: Harness) {
        harness.bridge.stop();
        harness.gui.post(&Request::list_watches().into());
        assert!(harness.local_recorder.seen().is_empty());
    }

    #[rstest]
    fn starting_twice_registers_each_forwarder_once(harness: Harness) {
        harness.bridge.start();
        assert_eq!(harness.gui.subscriber_count(), 2);
        assert_eq!(harness.local.subscriber_count(), 2);
    }
}
