//! The state stack.
//!
//! The last entry is the current state and the only one that is updated.
//! Mutations are crate-private: outside this crate the stack can only be
//! changed by emitting transition events for the adapter to apply.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use tickstack_core::error::{CoreError, StateError};
use tickstack_core::event::StateRef;
use tickstack_core::state::{ActiveState, EventSink, StateContext};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::snapshot::{SnapshotEntry, StackSnapshot};

struct StackEntry {
    state_ref: StateRef,
    factory: String,
    state: Box<dyn ActiveState>,
    context: StateContext,
}

/// Ordered collection of active states with stack discipline.
pub struct StateStack {
    entries: Vec<StackEntry>,
    events: Arc<dyn EventSink>,
}

/// Runs one lifecycle hook. An error or a panic is logged and swallowed;
/// the mutation around the hook always completes.
fn run_hook<F>(state: &StateRef, hook: &'static str, call: F)
where
    F: FnOnce() -> Result<(), StateError>,
{
    match panic::catch_unwind(AssertUnwindSafe(call)) {
        Ok(Ok(())) => {}
        Ok(Err(err)) => warn!(state = %state, hook, error = %err, "lifecycle hook failed"),
        Err(payload) => warn!(
            state = %state,
            hook,
            panic = %panic_message(payload.as_ref()),
            "lifecycle hook panicked"
        ),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

impl StateStack {
    /// Creates an empty stack. Every state pushed onto it receives a context
    /// that emits into `events`.
    #[must_use]
    pub fn new(events: Arc<dyn EventSink>) -> Self {
        Self {
            entries: Vec::new(),
            events,
        }
    }

    /// Returns the current (top) state.
    #[must_use]
    pub fn current(&self) -> Option<&StateRef> {
        self.entries.last().map(|entry| &entry.state_ref)
    }

    /// Returns the number of states on the stack.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no state is on the stack.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the states bottom to top.
    #[must_use]
    pub fn refs(&self) -> Vec<StateRef> {
        self.entries.iter().map(|e| e.state_ref.clone()).collect()
    }

    /// Pauses the current state, then enters `state` on top of it.
    pub(crate) fn push(&mut self, factory: &str, state: Box<dyn ActiveState>) -> StateRef {
        if let Some(previous) = self.entries.last_mut() {
            run_hook(&previous.state_ref, "pause", || {
                previous.state.pause(&previous.context)
            });
        }
        self.enter_on_top(factory, state)
    }

    fn enter_on_top(&mut self, factory: &str, mut state: Box<dyn ActiveState>) -> StateRef {
        let state_ref = StateRef {
            id: Uuid::new_v4(),
            name: state.name().to_owned(),
        };
        let context = StateContext::new(state_ref.id, Arc::clone(&self.events));
        run_hook(&state_ref, "enter", || state.enter(&context));

        debug!(state = %state_ref, depth = self.entries.len() + 1, "state entered");
        self.entries.push(StackEntry {
            state_ref: state_ref.clone(),
            factory: factory.to_owned(),
            state,
            context,
        });
        state_ref
    }

    /// Exits and removes the current state, then resumes the one below it.
    /// The removed state is dropped.
    pub(crate) fn pop(&mut self) -> Option<StateRef> {
        let mut entry = self.entries.pop()?;
        run_hook(&entry.state_ref, "exit", || entry.state.exit(&entry.context));

        if let Some(next) = self.entries.last_mut() {
            run_hook(&next.state_ref, "resume", || next.state.resume(&next.context));
        }

        debug!(state = %entry.state_ref, depth = self.entries.len(), "state popped");
        Some(entry.state_ref)
    }

    /// Exits the current state (if any) and enters `state` in its place.
    /// Nothing below is paused or resumed.
    pub(crate) fn replace(
        &mut self,
        factory: &str,
        state: Box<dyn ActiveState>,
    ) -> (Option<StateRef>, StateRef) {
        let exited = self.entries.pop().map(|mut entry| {
            run_hook(&entry.state_ref, "exit", || entry.state.exit(&entry.context));
            entry.state_ref
        });
        (exited, self.enter_on_top(factory, state))
    }

    /// Exits every state from top to bottom without resuming anything in
    /// between. Returns the exited states in exit order.
    pub(crate) fn clear(&mut self) -> Vec<StateRef> {
        let mut exited = Vec::with_capacity(self.entries.len());
        while let Some(mut entry) = self.entries.pop() {
            run_hook(&entry.state_ref, "exit", || entry.state.exit(&entry.context));
            exited.push(entry.state_ref);
        }
        exited
    }

    /// Updates the current state only. Returns `false` if the stack is empty.
    pub(crate) fn update_current(&mut self, dt: Duration) -> bool {
        let Some(top) = self.entries.last_mut() else {
            return false;
        };
        run_hook(&top.state_ref, "update", || top.state.update(&top.context, dt));
        true
    }

    /// Captures every state, bottom to top.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Snapshot` if any state fails to serialize.
    pub(crate) fn snapshot(&self) -> Result<StackSnapshot, CoreError> {
        let entries = self
            .entries
            .iter()
            .map(|entry| {
                let state = entry.state.serialize().map_err(|e| {
                    CoreError::Snapshot(format!(
                        "state {} could not be captured: {e}",
                        entry.state_ref
                    ))
                })?;
                Ok(SnapshotEntry {
                    factory: entry.factory.clone(),
                    name: entry.state_ref.name.clone(),
                    state,
                })
            })
            .collect::<Result<Vec<_>, CoreError>>()?;
        Ok(StackSnapshot::new(entries))
    }
}

impl fmt::Debug for StateStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateStack")
            .field("states", &self.refs())
            .finish_non_exhaustive()
    }
}
