//! Route modules.

pub mod events;
pub mod health;
pub mod states;
pub mod stats;

#[cfg(test)]
pub(crate) fn test_app_state() -> crate::state::AppState {
    use std::sync::Arc;

    use chrono::Utc;
    use tickstack_bus::EventBus;
    use tickstack_core::config::{BusConfig, SchedulerConfig};
    use tickstack_scheduler::Scheduler;
    use tickstack_test_support::FixedClock;

    let clock = Arc::new(FixedClock(Utc::now()));
    let bus = EventBus::new(clock.clone(), BusConfig::default());
    let scheduler = Scheduler::new(bus.clone(), clock, SchedulerConfig::default()).handle();
    let (state, _subscriptions) =
        crate::state::AppState::attach(bus, scheduler, crate::demo::registry(), 16);
    state
}
