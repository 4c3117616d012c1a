//! Event recorders that capture what reached a callback or a sink.

use std::sync::{Arc, Mutex};

use tickstack_core::error::HandlerError;
use tickstack_core::event::{Event, EventKind};
use tickstack_core::state::EventSink;

/// Records every event delivered to the callbacks it hands out.
#[derive(Debug, Clone, Default)]
pub struct EventRecorder {
    events: Arc<Mutex<Vec<Event>>>,
}

impl EventRecorder {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a bus callback that appends each delivered event.
    ///
    /// # Panics
    ///
    /// The callback panics if the internal mutex is poisoned.
    pub fn handler(&self) -> impl Fn(&Event) -> Result<(), HandlerError> + Send + Sync + use<> {
        let events = Arc::clone(&self.events);
        move |event: &Event| {
            events.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    /// Returns a snapshot of the recorded events.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    /// Returns the recorded event type names, in delivery order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn event_types(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.event_type().to_owned())
            .collect()
    }
}

/// An `EventSink` that records emitted kinds instead of queueing them.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    emitted: Arc<Mutex<Vec<EventKind>>>,
}

impl RecordingSink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of everything emitted so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn emitted(&self) -> Vec<EventKind> {
        self.emitted.lock().unwrap().clone()
    }

    /// Returns the emitted event type names, in emission order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn event_types(&self) -> Vec<String> {
        self.emitted
            .lock()
            .unwrap()
            .iter()
            .map(|k| k.event_type().to_owned())
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, kind: EventKind) {
        self.emitted.lock().unwrap().push(kind);
    }
}
