//! Subscription handles.

use std::fmt;
use std::sync::{Arc, Weak};

use tickstack_core::error::HandlerError;
use tickstack_core::event::Event;

use crate::bus::BusInner;

/// Callback invoked for each matching event.
pub(crate) type Callback = Arc<dyn Fn(&Event) -> Result<(), HandlerError> + Send + Sync>;

/// Identity of one registration, stable for the lifetime of the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// One entry in a per-name subscriber list.
#[derive(Clone)]
pub(crate) struct Registration {
    pub(crate) id: SubscriptionId,
    pub(crate) callback: Callback,
}

/// Capability that removes exactly one registration.
///
/// Dropping the handle leaves the registration in place.
#[derive(Debug, Clone)]
pub struct Subscription {
    bus: Weak<BusInner>,
    event_type: String,
    id: SubscriptionId,
}

impl Subscription {
    pub(crate) fn new(bus: Weak<BusInner>, event_type: String, id: SubscriptionId) -> Self {
        Self {
            bus,
            event_type,
            id,
        }
    }

    /// Returns the registration's identity.
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Returns the event type this registration listens to.
    #[must_use]
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Removes the registration. Returns `true` if it was still registered,
    /// `false` on every later call or if the bus is gone.
    ///
    /// Safe to call from inside a callback: the dispatch in progress keeps
    /// its snapshot, later dispatches no longer see the callback.
    pub fn unsubscribe(&self) -> bool {
        self.bus
            .upgrade()
            .is_some_and(|bus| bus.remove_registration(&self.event_type, self.id))
    }
}
