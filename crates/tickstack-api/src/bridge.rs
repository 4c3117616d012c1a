//! Transport bridge between the bus and remote observers.
//!
//! Outbound, every dispatched event except `Tick` is rendered as JSON and
//! broadcast to whoever holds a receiver. Inbound, remote requests are only
//! ever enqueued with `emit`; nothing from a transport is dispatched
//! synchronously.

use serde_json::Value;
use tickstack_bus::{EventBus, Subscription};
use tickstack_core::event::{EventKind, RESERVED_EVENT_TYPES, WILDCARD};
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::ApiError;

/// Fans bus events out to remote observers and feeds remote events in.
#[derive(Debug, Clone)]
pub struct TransportBridge {
    bus: EventBus,
    outbound: broadcast::Sender<Value>,
}

impl TransportBridge {
    /// Subscribes the bridge to `bus`. Slow observers lose the oldest
    /// events once `capacity` is exceeded.
    pub fn attach(bus: &EventBus, capacity: usize) -> (Self, Subscription) {
        let (outbound, _) = broadcast::channel(capacity.max(1));

        let sender = outbound.clone();
        let subscription = bus.subscribe(WILDCARD, move |event| {
            if matches!(event.kind, EventKind::Tick { .. }) {
                return Ok(());
            }
            // No receivers is not an error; the event is simply unobserved.
            if sender.send(event.to_json()).is_err() {
                debug!(event_type = event.event_type(), "no remote observers");
            }
            Ok(())
        });

        let bridge = Self {
            bus: bus.clone(),
            outbound,
        };
        (bridge, subscription)
    }

    /// Returns a receiver for outbound events.
    #[must_use]
    pub fn observe(&self) -> broadcast::Receiver<Value> {
        self.outbound.subscribe()
    }

    /// Enqueues a domain event received from a remote client.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::BadRequest` if the name is empty, the wildcard, or
    /// one of the runtime's own event types.
    pub fn submit(&self, event_type: &str, payload: Value) -> Result<(), ApiError> {
        let event_type = event_type.trim();
        if event_type.is_empty() || event_type == WILDCARD {
            return Err(ApiError::BadRequest(format!(
                "`{event_type}` is not a valid event type"
            )));
        }
        if RESERVED_EVENT_TYPES.contains(&event_type) {
            return Err(ApiError::BadRequest(format!(
                "`{event_type}` is reserved by the runtime"
            )));
        }
        debug!(event_type, "remote event accepted");
        self.bus.emit(EventKind::domain(event_type, payload));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::Utc;
    use serde_json::json;
    use tickstack_core::config::BusConfig;
    use tickstack_test_support::{EventRecorder, FixedClock};

    use super::*;

    fn test_bus() -> EventBus {
        EventBus::new(Arc::new(FixedClock(Utc::now())), BusConfig::default())
    }

    #[test]
    fn test_submit_enqueues_without_dispatching() {
        // Arrange
        let bus = test_bus();
        let (bridge, _subscription) = TransportBridge::attach(&bus, 16);
        let recorder = EventRecorder::new();
        bus.subscribe("chat.message", recorder.handler());

        // Act
        bridge.submit("chat.message", json!({ "text": "hi" })).unwrap();

        // Assert
        assert!(recorder.events().is_empty());
        assert_eq!(bus.pending(), 1);
        bus.drain_pending();
        assert_eq!(recorder.event_types(), vec!["chat.message"]);
    }

    #[test]
    fn test_submit_rejects_reserved_and_empty_names() {
        let bus = test_bus();
        let (bridge, _subscription) = TransportBridge::attach(&bus, 16);

        assert!(matches!(bridge.submit("tick", json!({})), Err(ApiError::BadRequest(_))));
        assert!(matches!(bridge.submit("push_state", json!({})), Err(ApiError::BadRequest(_))));
        assert!(matches!(bridge.submit("  ", json!({})), Err(ApiError::BadRequest(_))));
        assert!(matches!(bridge.submit("*", json!({})), Err(ApiError::BadRequest(_))));
        assert_eq!(bus.pending(), 0);
    }

    #[test]
    fn test_dispatched_events_are_broadcast_except_ticks() {
        // Arrange
        let bus = test_bus();
        let (bridge, _subscription) = TransportBridge::attach(&bus, 16);
        let mut observer = bridge.observe();

        // Act
        bus.emit(EventKind::Tick {
            dt: Duration::from_millis(16),
        });
        bus.emit(EventKind::domain("score", json!({ "points": 10 })));
        bus.drain_pending();

        // Assert
        let forwarded = observer.try_recv().unwrap();
        assert_eq!(forwarded["event_type"], "score");
        assert_eq!(forwarded["payload"], json!({ "points": 10 }));
        assert!(observer.try_recv().is_err());
    }
}
