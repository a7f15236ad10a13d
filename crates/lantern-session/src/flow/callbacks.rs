//! Outward callbacks of the session flow.

use parking_lot::RwLock;
use std::sync::Arc;

use crate::services::SessionEvent;

/// Consumer of events the session flow does not handle itself
pub trait SessionFlowCallback: Send + Sync {
    /// The user asked to report a bug
    fn on_open_bug_report(&self) {}

    /// A session event was observed that the flow does not navigate for
    fn on_session_event(&self, _event: &SessionEvent) {}
}

/// Registered callback consumers
#[derive(Clone, Default)]
pub struct CallbackConsumers {
    consumers: Arc<RwLock<Vec<Arc<dyn SessionFlowCallback>>>>,
}

impl CallbackConsumers {
    /// Create an empty consumer list
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a consumer
    pub fn add(&self, consumer: Arc<dyn SessionFlowCallback>) {
        self.consumers.write().push(consumer);
    }

    /// Number of registered consumers
    pub fn len(&self) -> usize {
        self.consumers.read().len()
    }

    /// Check if no consumer is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Notify every consumer of a bug report request
    pub fn open_bug_report(&self) {
        for consumer in self.snapshot() {
            consumer.on_open_bug_report();
        }
    }

    /// Forward a session event to every consumer
    pub fn session_event(&self, event: &SessionEvent) {
        for consumer in self.snapshot() {
            consumer.on_session_event(event);
        }
    }

    // Consumers run outside the lock so they may register further consumers.
    fn snapshot(&self) -> Vec<Arc<dyn SessionFlowCallback>> {
        self.consumers.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::RoomId;
    use crate::testing::RecordingFlowCallback;

    #[test]
    fn every_consumer_is_notified() {
        let consumers = CallbackConsumers::new();
        let first = RecordingFlowCallback::new();
        let second = RecordingFlowCallback::new();
        consumers.add(first.clone());
        consumers.add(second.clone());

        consumers.open_bug_report();
        consumers.session_event(&SessionEvent::RoomInviteReceived {
            room_id: RoomId::new("!inv"),
        });

        assert_eq!(consumers.len(), 2);
        for consumer in [first, second] {
            assert_eq!(consumer.bug_reports(), 1);
            assert_eq!(consumer.events().len(), 1);
        }
    }
}
