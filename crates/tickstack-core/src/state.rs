//! Active-state abstractions.
//!
//! An [`ActiveState`] is one entry on the state stack (a map screen, a
//! dialogue, a menu). States never touch the stack themselves; they request
//! transitions by emitting `PushState`, `PopState` or `ChangeState` through
//! their [`StateContext`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use uuid::Uuid;

use crate::error::StateError;
use crate::event::EventKind;

/// Destination for deferred events.
///
/// Implemented by the event bus; states and transition handlers only ever
/// see this seam, so they cannot dispatch synchronously.
pub trait EventSink: Send + Sync {
    /// Enqueues an event for deferred processing.
    fn emit(&self, kind: EventKind);
}

/// Context injected into a state by the stack.
///
/// The context outlives any single state; the state borrows it for the
/// duration of each hook.
#[derive(Clone)]
pub struct StateContext {
    state_id: Uuid,
    events: Arc<dyn EventSink>,
}

impl StateContext {
    /// Creates a context for the state identified by `state_id`.
    #[must_use]
    pub fn new(state_id: Uuid, events: Arc<dyn EventSink>) -> Self {
        Self { state_id, events }
    }

    /// Returns the identifier the stack assigned to this state.
    #[must_use]
    pub fn state_id(&self) -> Uuid {
        self.state_id
    }

    /// Enqueues an event on the owning application's bus.
    pub fn emit(&self, kind: EventKind) {
        self.events.emit(kind);
    }
}

impl fmt::Debug for StateContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateContext")
            .field("state_id", &self.state_id)
            .finish_non_exhaustive()
    }
}

/// A unit of application behavior that can sit on the state stack.
///
/// Every hook defaults to a no-op except [`ActiveState::update`]. A hook
/// that fails is logged by the stack; the transition still completes.
pub trait ActiveState: Send {
    /// Returns the state's display name.
    fn name(&self) -> &str;

    /// Called once when the state is pushed.
    ///
    /// # Errors
    ///
    /// Returns `StateError::Hook` if entering fails.
    fn enter(&mut self, _ctx: &StateContext) -> Result<(), StateError> {
        Ok(())
    }

    /// Called once when the state is removed from the stack.
    ///
    /// # Errors
    ///
    /// Returns `StateError::Hook` if exiting fails.
    fn exit(&mut self, _ctx: &StateContext) -> Result<(), StateError> {
        Ok(())
    }

    /// Called when another state is pushed on top of this one.
    ///
    /// # Errors
    ///
    /// Returns `StateError::Hook` if pausing fails.
    fn pause(&mut self, _ctx: &StateContext) -> Result<(), StateError> {
        Ok(())
    }

    /// Called when this state becomes the top again.
    ///
    /// # Errors
    ///
    /// Returns `StateError::Hook` if resuming fails.
    fn resume(&mut self, _ctx: &StateContext) -> Result<(), StateError> {
        Ok(())
    }

    /// Advances the state by one frame. Only the top of the stack is updated.
    ///
    /// # Errors
    ///
    /// Returns `StateError::Hook` if the frame could not be processed.
    fn update(&mut self, ctx: &StateContext, dt: Duration) -> Result<(), StateError>;

    /// Captures the state for persistence.
    ///
    /// # Errors
    ///
    /// Returns `StateError::Serialization` if the state cannot be captured.
    fn serialize(&self) -> Result<Value, StateError> {
        Ok(Value::Null)
    }
}

/// Builds states for transition requests and snapshot restores.
pub trait StateFactory: Send + Sync {
    /// Returns the factory name used in snapshots and the registry.
    fn name(&self) -> &str;

    /// Constructs a new state from request parameters.
    ///
    /// # Errors
    ///
    /// Returns `StateError` if the parameters are rejected or no state can
    /// be produced.
    fn create(&self, params: &Value) -> Result<Box<dyn ActiveState>, StateError>;

    /// Reconstructs a state from a blob produced by [`ActiveState::serialize`].
    ///
    /// Defaults to [`StateFactory::create`] with the blob as parameters.
    ///
    /// # Errors
    ///
    /// Returns `StateError` if the blob cannot be decoded.
    fn deserialize(&self, blob: &Value) -> Result<Box<dyn ActiveState>, StateError> {
        self.create(blob)
    }
}
