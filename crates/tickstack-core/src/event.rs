//! Event model shared by every bus participant.
//!
//! Each event is a tagged [`EventKind`] whose tag determines the event type
//! name, wrapped in an [`Event`] envelope that the bus stamps at enqueue time.
//! Runtime-internal events have fixed payload types; application events use
//! the open [`EventKind::Domain`] variant.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use uuid::Uuid;

use crate::state::StateFactory;

/// Event type for [`EventKind::Tick`].
pub const TICK: &str = "tick";

/// Event type for [`EventKind::Init`].
pub const INIT: &str = "init";

/// Event type for [`EventKind::Shutdown`].
pub const SHUTDOWN: &str = "shutdown";

/// Event type for [`EventKind::EnterState`].
pub const ENTER_STATE: &str = "enter_state";

/// Event type for [`EventKind::ExitState`].
pub const EXIT_STATE: &str = "exit_state";

/// Event type for [`EventKind::PushState`].
pub const PUSH_STATE: &str = "push_state";

/// Event type for [`EventKind::PopState`].
pub const POP_STATE: &str = "pop_state";

/// Event type for [`EventKind::ChangeState`].
pub const CHANGE_STATE: &str = "change_state";

/// Subscription name that matches every event.
pub const WILDCARD: &str = "*";

/// Event types produced or consumed by the runtime itself. Domain events
/// must not reuse them.
pub const RESERVED_EVENT_TYPES: [&str; 8] = [
    TICK,
    INIT,
    SHUTDOWN,
    ENTER_STATE,
    EXIT_STATE,
    PUSH_STATE,
    POP_STATE,
    CHANGE_STATE,
];

/// Identifies a state instance in announcements and snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateRef {
    /// Unique identifier assigned when the state was pushed.
    pub id: Uuid,
    /// The state's display name.
    pub name: String,
}

impl fmt::Display for StateRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.id)
    }
}

/// A request to construct a state, addressed to the transition adapter.
#[derive(Clone)]
pub struct TransitionRequest {
    /// Factory used to build the new state.
    pub factory: Arc<dyn StateFactory>,
    /// Construction parameters handed to the factory.
    pub params: Value,
}

impl TransitionRequest {
    /// Creates a request with the given factory and parameters.
    #[must_use]
    pub fn new(factory: Arc<dyn StateFactory>, params: Value) -> Self {
        Self { factory, params }
    }

    /// Creates a request with no construction parameters.
    #[must_use]
    pub fn without_params(factory: Arc<dyn StateFactory>) -> Self {
        Self::new(factory, Value::Null)
    }
}

impl fmt::Debug for TransitionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransitionRequest")
            .field("factory", &self.factory.name())
            .field("params", &self.params)
            .finish()
    }
}

/// Event payload variants.
#[derive(Debug, Clone)]
pub enum EventKind {
    /// A scheduler frame began; `dt` is the time since the previous frame.
    Tick {
        /// Wall-clock delta since the previous frame started.
        dt: Duration,
    },
    /// The scheduler started running.
    Init,
    /// The application is shutting down.
    Shutdown,
    /// A state was pushed onto the stack and entered.
    EnterState {
        /// The entered state.
        state: StateRef,
    },
    /// A state was exited and removed from the stack.
    ExitState {
        /// The exited state.
        state: StateRef,
    },
    /// Request: construct a state and push it.
    PushState(TransitionRequest),
    /// Request: pop the current state.
    PopState,
    /// Request: replace the current state with a newly constructed one.
    ChangeState(TransitionRequest),
    /// An application-defined event.
    Domain {
        /// Event type name.
        name: String,
        /// Key/value payload.
        payload: Map<String, Value>,
    },
}

impl EventKind {
    /// Builds a domain event. Non-object payloads are stored under `"value"`.
    #[must_use]
    pub fn domain(name: impl Into<String>, payload: Value) -> Self {
        let payload = match payload {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("value".to_owned(), other);
                map
            }
        };
        Self::Domain {
            name: name.into(),
            payload,
        }
    }

    /// Returns the event type name used for subscription routing.
    #[must_use]
    pub fn event_type(&self) -> &str {
        match self {
            Self::Tick { .. } => TICK,
            Self::Init => INIT,
            Self::Shutdown => SHUTDOWN,
            Self::EnterState { .. } => ENTER_STATE,
            Self::ExitState { .. } => EXIT_STATE,
            Self::PushState(_) => PUSH_STATE,
            Self::PopState => POP_STATE,
            Self::ChangeState(_) => CHANGE_STATE,
            Self::Domain { name, .. } => name,
        }
    }

    /// Renders the payload as JSON for observers outside the process.
    #[must_use]
    pub fn to_payload(&self) -> Value {
        match self {
            Self::Tick { dt } => json!({ "dt_ms": duration_millis(*dt) }),
            Self::Init | Self::Shutdown | Self::PopState => json!({}),
            Self::EnterState { state } | Self::ExitState { state } => {
                json!({ "state": { "id": state.id, "name": state.name } })
            }
            Self::PushState(request) | Self::ChangeState(request) => json!({
                "factory": request.factory.name(),
                "params": request.params,
            }),
            Self::Domain { payload, .. } => Value::Object(payload.clone()),
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn duration_millis(duration: Duration) -> f64 {
    duration.as_micros() as f64 / 1000.0
}

/// Metadata stamped onto every event when it is emitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Unique event identifier.
    pub event_id: Uuid,
    /// Monotonically increasing emission order within one bus.
    pub sequence_number: u64,
    /// Timestamp of emission.
    pub emitted_at: DateTime<Utc>,
}

/// An emitted event: payload plus emission metadata.
#[derive(Debug, Clone)]
pub struct Event {
    /// Emission metadata.
    pub metadata: EventMetadata,
    /// Event-specific payload.
    pub kind: EventKind,
}

impl Event {
    /// Returns the event type name.
    #[must_use]
    pub fn event_type(&self) -> &str {
        self.kind.event_type()
    }

    /// Returns the domain payload, if this is a domain event.
    #[must_use]
    pub fn domain_payload(&self) -> Option<&Map<String, Value>> {
        match &self.kind {
            EventKind::Domain { payload, .. } => Some(payload),
            _ => None,
        }
    }

    /// Renders the full envelope as JSON.
    #[must_use]
    pub fn to_json(&self) -> Value {
        json!({
            "event_id": self.metadata.event_id,
            "event_type": self.event_type(),
            "sequence_number": self.metadata.sequence_number,
            "emitted_at": self.metadata.emitted_at,
            "payload": self.kind.to_payload(),
        })
    }
}
