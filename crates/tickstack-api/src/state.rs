//! Shared application state.

use std::sync::Arc;

use tickstack_bus::{EventBus, Subscription};
use tickstack_scheduler::SchedulerHandle;
use tickstack_state::StateRegistry;

use crate::bridge::TransportBridge;
use crate::view::StackView;

/// Default number of outbound events buffered per remote observer.
pub const DEFAULT_OBSERVER_CAPACITY: usize = 256;

/// Application state shared across all request handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Bus owned by the scheduler thread; handlers only `emit` on it.
    pub bus: EventBus,
    /// Control handle for the running scheduler.
    pub scheduler: SchedulerHandle,
    /// Factories clients may name in push and change requests.
    pub registry: Arc<StateRegistry>,
    /// Read-only mirror of the state stack.
    pub view: StackView,
    /// Inbound and outbound event transport.
    pub bridge: TransportBridge,
}

impl AppState {
    /// Create new application state, attaching the stack view and the
    /// transport bridge to `bus`.
    ///
    /// Must be called before the first state is pushed so the view sees
    /// every announcement. The returned subscriptions stay live for as long
    /// as the bus does.
    #[must_use]
    pub fn attach(
        bus: EventBus,
        scheduler: SchedulerHandle,
        registry: StateRegistry,
        observer_capacity: usize,
    ) -> (Self, Vec<Subscription>) {
        let (view, mut subscriptions) = StackView::attach(&bus);
        let (bridge, bridge_subscription) = TransportBridge::attach(&bus, observer_capacity);
        subscriptions.push(bridge_subscription);

        let state = Self {
            bus,
            scheduler,
            registry: Arc::new(registry),
            view,
            bridge,
        };
        (state, subscriptions)
    }
}
