//! Transition handlers for the state stack.
//!
//! Each handler applies one transition request to the stack and announces
//! the outcome on the supplied sink. A rejected request leaves the stack
//! exactly as it was.

use std::time::Duration;

use tickstack_core::error::CoreError;
use tickstack_core::event::{EventKind, StateRef, TransitionRequest};
use tickstack_core::state::{ActiveState, EventSink};
use tracing::info;

use crate::domain::stack::StateStack;

/// Runs the request's factory. A factory that produces no state is reported
/// like any other construction failure.
fn construct(request: &TransitionRequest) -> Result<Box<dyn ActiveState>, CoreError> {
    request
        .factory
        .create(&request.params)
        .map_err(|source| CoreError::StateConstruction {
            factory: request.factory.name().to_owned(),
            source,
        })
}

/// Emits `Shutdown` if the stack has just become empty.
fn announce_if_empty(stack: &StateStack, events: &dyn EventSink) {
    if stack.is_empty() {
        info!("state stack is empty; requesting shutdown");
        events.emit(EventKind::Shutdown);
    }
}

/// Handles `PushState`: constructs the state, pushes it and announces
/// `EnterState`.
///
/// # Errors
///
/// Returns `CoreError::StateConstruction` if the factory fails; the stack is
/// untouched.
pub fn handle_push_state(
    stack: &mut StateStack,
    request: &TransitionRequest,
    events: &dyn EventSink,
) -> Result<StateRef, CoreError> {
    let state = construct(request)?;
    let entered = stack.push(request.factory.name(), state);
    events.emit(EventKind::EnterState {
        state: entered.clone(),
    });
    Ok(entered)
}

/// Handles `PopState`: pops the current state and announces `ExitState`,
/// followed by `Shutdown` when nothing is left.
///
/// # Errors
///
/// Returns `CoreError::InvalidTransition` if the stack is empty.
pub fn handle_pop_state(
    stack: &mut StateStack,
    events: &dyn EventSink,
) -> Result<StateRef, CoreError> {
    let exited = stack
        .pop()
        .ok_or_else(|| CoreError::InvalidTransition("pop on an empty state stack".into()))?;
    events.emit(EventKind::ExitState {
        state: exited.clone(),
    });
    announce_if_empty(stack, events);
    Ok(exited)
}

/// Handles `ChangeState`: constructs the replacement first, then exits the
/// current state and enters the new one, announcing `ExitState` (if a state
/// was exited) and then `EnterState`.
///
/// # Errors
///
/// Returns `CoreError::StateConstruction` if the factory fails; the stack is
/// untouched.
pub fn handle_change_state(
    stack: &mut StateStack,
    request: &TransitionRequest,
    events: &dyn EventSink,
) -> Result<StateRef, CoreError> {
    let state = construct(request)?;
    let (exited, entered) = stack.replace(request.factory.name(), state);
    if let Some(exited) = exited {
        events.emit(EventKind::ExitState { state: exited });
    }
    events.emit(EventKind::EnterState {
        state: entered.clone(),
    });
    Ok(entered)
}

/// Handles `Tick`: updates the current state only. Returns `false` when the
/// stack is empty.
pub fn handle_tick(stack: &mut StateStack, dt: Duration) -> bool {
    stack.update_current(dt)
}
