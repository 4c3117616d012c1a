//! Snapshot and restore of the whole state stack.

use tickstack_core::error::CoreError;
use tickstack_core::event::{EventKind, StateRef};
use tickstack_core::state::{ActiveState, EventSink};
use tracing::info;

use crate::domain::registry::StateRegistry;
use crate::domain::snapshot::{SNAPSHOT_FORMAT_VERSION, StackSnapshot};
use crate::domain::stack::StateStack;

/// Captures the stack, bottom to top.
///
/// # Errors
///
/// Returns `CoreError::Snapshot` if a state cannot be serialized.
pub fn take_snapshot(stack: &StateStack) -> Result<StackSnapshot, CoreError> {
    stack.snapshot()
}

/// Replaces the whole stack with the states in `snapshot`.
///
/// Every state is rebuilt before the current stack is touched, so any
/// failure leaves it intact. On success the old states are exited top to
/// bottom (announcing `ExitState` for each) and the restored ones pushed
/// bottom to top (announcing `EnterState` for each). Returns the restored
/// states, bottom first.
///
/// # Errors
///
/// Returns `CoreError::Snapshot` for an empty or incompatible snapshot,
/// `CoreError::UnknownFactory` if a factory is not registered, and
/// `CoreError::StateConstruction` if a factory cannot rebuild its state.
pub fn restore_snapshot(
    stack: &mut StateStack,
    snapshot: &StackSnapshot,
    registry: &StateRegistry,
    events: &dyn EventSink,
) -> Result<Vec<StateRef>, CoreError> {
    if snapshot.format_version != SNAPSHOT_FORMAT_VERSION {
        return Err(CoreError::Snapshot(format!(
            "unsupported snapshot format version {}",
            snapshot.format_version
        )));
    }
    if snapshot.entries.is_empty() {
        return Err(CoreError::Snapshot("snapshot contains no states".into()));
    }

    let rebuilt = snapshot
        .entries
        .iter()
        .map(|entry| {
            let factory = registry
                .get(&entry.factory)
                .ok_or_else(|| CoreError::UnknownFactory(entry.factory.clone()))?;
            let state = factory
                .deserialize(&entry.state)
                .map_err(|source| CoreError::StateConstruction {
                    factory: entry.factory.clone(),
                    source,
                })?;
            Ok((entry.factory.as_str(), state))
        })
        .collect::<Result<Vec<(&str, Box<dyn ActiveState>)>, CoreError>>()?;

    for exited in stack.clear() {
        events.emit(EventKind::ExitState { state: exited });
    }

    let restored: Vec<StateRef> = rebuilt
        .into_iter()
        .map(|(factory, state)| {
            let entered = stack.push(factory, state);
            events.emit(EventKind::EnterState {
                state: entered.clone(),
            });
            entered
        })
        .collect();

    info!(depth = restored.len(), "state stack restored");
    Ok(restored)
}
