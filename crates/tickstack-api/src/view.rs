//! Read-only mirror of the state stack for request handlers.
//!
//! Built purely from `EnterState`/`ExitState` announcements, so handlers on
//! the async runtime never touch the stack owned by the scheduler thread.

use std::sync::{Arc, PoisonError, RwLock};

use tickstack_bus::{EventBus, Subscription};
use tickstack_core::event::{ENTER_STATE, EXIT_STATE, EventKind, StateRef};

/// Mirror of the stack, bottom to top, as last announced on the bus.
#[derive(Debug, Clone, Default)]
pub struct StackView {
    states: Arc<RwLock<Vec<StateRef>>>,
}

impl StackView {
    /// Creates a view that follows the announcements on `bus`.
    ///
    /// The view must be attached before the first state is pushed.
    pub fn attach(bus: &EventBus) -> (Self, Vec<Subscription>) {
        let view = Self::default();

        let entered = view.clone();
        let on_enter = bus.subscribe(ENTER_STATE, move |event| {
            if let EventKind::EnterState { state } = &event.kind {
                entered.write().push(state.clone());
            }
            Ok(())
        });

        let exited = view.clone();
        let on_exit = bus.subscribe(EXIT_STATE, move |event| {
            if let EventKind::ExitState { state } = &event.kind {
                exited.write().retain(|s| s.id != state.id);
            }
            Ok(())
        });

        (view, vec![on_enter, on_exit])
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<StateRef>> {
        self.states.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the mirrored states, bottom first.
    #[must_use]
    pub fn states(&self) -> Vec<StateRef> {
        self.states
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns the current (top) state.
    #[must_use]
    pub fn current(&self) -> Option<StateRef> {
        self.states().pop()
    }

    /// Returns the mirrored stack depth.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.states.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}
