//! Bus adapter that owns the state stack.
//!
//! [`StateTransitionAdapter`] subscribes to the transition and tick events
//! and is the only writer of its [`StateStack`]. Callbacks run on whichever
//! thread drains the bus; a transition request that arrives while that same
//! thread is already inside a stack mutation (a state dispatching
//! immediately from one of its hooks) is re-queued instead of deadlocking.

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread::{self, ThreadId};

use tickstack_bus::{EventBus, Subscription, WeakEventBus};
use tickstack_core::error::{CoreError, HandlerError};
use tickstack_core::event::{CHANGE_STATE, Event, EventKind, POP_STATE, PUSH_STATE, StateRef, TICK};
use tickstack_core::state::EventSink;
use tracing::{debug, warn};

use crate::application::persistence::{restore_snapshot, take_snapshot};
use crate::application::transition_handlers::{
    handle_change_state, handle_pop_state, handle_push_state, handle_tick,
};
use crate::domain::registry::StateRegistry;
use crate::domain::snapshot::StackSnapshot;
use crate::domain::stack::StateStack;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct StackCell {
    stack: Mutex<StateStack>,
    holder: Mutex<Option<ThreadId>>,
    published: RwLock<Vec<StateRef>>,
}

impl StackCell {
    /// Locks the stack, or returns `None` if the calling thread already
    /// holds it.
    fn acquire(&self) -> Option<StackGuard<'_>> {
        let me = thread::current().id();
        if *lock(&self.holder) == Some(me) {
            return None;
        }
        let stack = lock(&self.stack);
        *lock(&self.holder) = Some(me);
        Some(StackGuard { cell: self, stack })
    }

    fn published(&self) -> Vec<StateRef> {
        self.published
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Exclusive access to the stack. Republishes the stack's states on release.
struct StackGuard<'a> {
    cell: &'a StackCell,
    stack: MutexGuard<'a, StateStack>,
}

impl Deref for StackGuard<'_> {
    type Target = StateStack;

    fn deref(&self) -> &StateStack {
        &self.stack
    }
}

impl DerefMut for StackGuard<'_> {
    fn deref_mut(&mut self) -> &mut StateStack {
        &mut self.stack
    }
}

impl Drop for StackGuard<'_> {
    fn drop(&mut self) {
        *self
            .cell
            .published
            .write()
            .unwrap_or_else(PoisonError::into_inner) = self.stack.refs();
        *lock(&self.cell.holder) = None;
    }
}

fn on_transition(
    cell: &StackCell,
    events: &WeakEventBus,
    event: &Event,
) -> Result<(), HandlerError> {
    let Some(mut stack) = cell.acquire() else {
        debug!(
            event_type = event.event_type(),
            "state stack busy; transition re-queued"
        );
        events.emit(event.kind.clone());
        return Ok(());
    };

    let outcome = match &event.kind {
        EventKind::PushState(request) => handle_push_state(&mut stack, request, events),
        EventKind::PopState => handle_pop_state(&mut stack, events),
        EventKind::ChangeState(request) => handle_change_state(&mut stack, request, events),
        _ => return Ok(()),
    };

    if let Err(err) = outcome {
        warn!(
            event_type = event.event_type(),
            error = %err,
            "invalid state transition ignored"
        );
    }
    Ok(())
}

fn on_tick(cell: &StackCell, event: &Event) -> Result<(), HandlerError> {
    let EventKind::Tick { dt } = event.kind else {
        return Ok(());
    };
    match cell.acquire() {
        Some(mut stack) => {
            handle_tick(&mut stack, dt);
        }
        None => debug!("state stack busy; tick skipped"),
    }
    Ok(())
}

/// Sole owner of the state stack; applies transition events from the bus.
///
/// Dropping the adapter unsubscribes it. The states themselves are dropped
/// with it, without `exit` being called.
pub struct StateTransitionAdapter {
    cell: Arc<StackCell>,
    events: WeakEventBus,
    subscriptions: Vec<Subscription>,
}

impl StateTransitionAdapter {
    /// Creates an empty stack and subscribes it to `bus`.
    #[must_use]
    pub fn install(bus: &EventBus) -> Self {
        let events = bus.downgrade();
        let cell = Arc::new(StackCell {
            stack: Mutex::new(StateStack::new(Arc::new(events.clone()))),
            holder: Mutex::new(None),
            published: RwLock::new(Vec::new()),
        });

        let mut subscriptions = Vec::with_capacity(4);
        for event_type in [PUSH_STATE, POP_STATE, CHANGE_STATE] {
            let cell = Arc::clone(&cell);
            let events = events.clone();
            subscriptions.push(bus.subscribe(event_type, move |event: &Event| {
                on_transition(&cell, &events, event)
            }));
        }
        let tick_cell = Arc::clone(&cell);
        subscriptions.push(bus.subscribe(TICK, move |event: &Event| on_tick(&tick_cell, event)));

        debug!("state transition adapter installed");
        Self {
            cell,
            events,
            subscriptions,
        }
    }

    /// Returns the current (top) state.
    #[must_use]
    pub fn current(&self) -> Option<StateRef> {
        self.cell.published().pop()
    }

    /// Returns the number of states on the stack.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.cell.published().len()
    }

    /// Returns the states bottom to top.
    #[must_use]
    pub fn states(&self) -> Vec<StateRef> {
        self.cell.published()
    }

    /// Returns `true` while at least one state is on the stack.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.depth() > 0
    }

    /// Captures the stack.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Snapshot` if a state cannot be serialized or the
    /// calling thread is in the middle of a transition.
    pub fn snapshot(&self) -> Result<StackSnapshot, CoreError> {
        let stack = self
            .cell
            .acquire()
            .ok_or_else(|| CoreError::Snapshot("state stack is mid-transition".into()))?;
        take_snapshot(&stack)
    }

    /// Replaces the stack with the states in `snapshot`. All or nothing.
    ///
    /// # Errors
    ///
    /// Returns the error from the restore, or `CoreError::InvalidTransition`
    /// if the calling thread is in the middle of a transition.
    pub fn restore(
        &self,
        snapshot: &StackSnapshot,
        registry: &StateRegistry,
    ) -> Result<Vec<StateRef>, CoreError> {
        let mut stack = self.cell.acquire().ok_or_else(|| {
            CoreError::InvalidTransition("state stack is mid-transition".into())
        })?;
        restore_snapshot(&mut stack, snapshot, registry, &self.events)
    }
}

impl Drop for StateTransitionAdapter {
    fn drop(&mut self) {
        for subscription in &self.subscriptions {
            subscription.unsubscribe();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use chrono::{TimeZone, Utc};
    use serde_json::{Value, json};
    use tickstack_core::config::BusConfig;
    use tickstack_core::error::StateError;
    use tickstack_core::event::{ENTER_STATE, EXIT_STATE, SHUTDOWN, TransitionRequest, WILDCARD};
    use tickstack_core::state::{ActiveState, StateContext, StateFactory};
    use tickstack_test_support::{
        EmptyFactory, EventRecorder, FixedClock, LifecycleCall, LifecycleLog, RecordingFactory,
    };

    use super::*;

    fn test_bus() -> EventBus {
        let now = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap();
        EventBus::new(Arc::new(FixedClock(now)), BusConfig::default())
    }

    fn push(bus: &EventBus, log: &LifecycleLog, name: &str) {
        bus.emit(EventKind::PushState(TransitionRequest::new(
            Arc::new(RecordingFactory::new("recording", log.clone())),
            json!({ "name": name }),
        )));
    }

    #[test]
    fn test_push_push_pop_pop_lifecycle() {
        // Arrange
        let bus = test_bus();
        let adapter = StateTransitionAdapter::install(&bus);
        let log = LifecycleLog::new();
        let recorder = EventRecorder::new();
        bus.subscribe(SHUTDOWN, recorder.handler());

        // Act / Assert
        push(&bus, &log, "A");
        bus.drain(10);
        assert_eq!(adapter.current().map(|s| s.name), Some("A".to_owned()));
        assert_eq!(log.count("A", LifecycleCall::Enter), 1);

        push(&bus, &log, "B");
        bus.drain(10);
        assert_eq!(log.count("A", LifecycleCall::Pause), 1);
        assert_eq!(log.count("B", LifecycleCall::Enter), 1);

        bus.emit(EventKind::PopState);
        bus.drain(10);
        assert_eq!(log.count("B", LifecycleCall::Exit), 1);
        assert_eq!(log.count("A", LifecycleCall::Resume), 1);

        bus.emit(EventKind::PopState);
        bus.drain(10);
        assert!(!adapter.is_active());
        assert_eq!(adapter.depth(), 0);
        assert_eq!(recorder.event_types(), vec![SHUTDOWN]);
    }

    #[test]
    fn test_push_of_factory_yielding_no_state_leaves_stack_unchanged() {
        // Arrange
        let bus = test_bus();
        let adapter = StateTransitionAdapter::install(&bus);
        let log = LifecycleLog::new();
        push(&bus, &log, "A");
        bus.drain(10);
        let before = adapter.states();
        let recorder = EventRecorder::new();
        bus.subscribe(ENTER_STATE, recorder.handler());

        // Act
        bus.emit(EventKind::PushState(TransitionRequest::without_params(
            Arc::new(EmptyFactory("nothing".into())),
        )));
        bus.drain(10);

        // Assert
        assert_eq!(adapter.states(), before);
        assert!(recorder.events().is_empty());
        assert_eq!(log.count("A", LifecycleCall::Pause), 0);
    }

    #[test]
    fn test_pop_on_empty_stack_is_a_no_op() {
        let bus = test_bus();
        let adapter = StateTransitionAdapter::install(&bus);
        let recorder = EventRecorder::new();
        bus.subscribe(WILDCARD, recorder.handler());

        bus.emit(EventKind::PopState);
        bus.drain(10);

        assert_eq!(adapter.depth(), 0);
        assert_eq!(recorder.event_types(), vec!["pop_state"]);
        assert_eq!(bus.stats().handler_faults, 0);
    }

    #[test]
    fn test_change_state_announces_exit_then_enter() {
        // Arrange
        let bus = test_bus();
        let adapter = StateTransitionAdapter::install(&bus);
        let log = LifecycleLog::new();
        bus.emit(EventKind::PushState(TransitionRequest::new(
            Arc::new(
                RecordingFactory::new("recording", log.clone()).failing_on(LifecycleCall::Exit),
            ),
            json!({ "name": "dialogue" }),
        )));
        bus.drain(10);
        let recorder = EventRecorder::new();
        bus.subscribe(EXIT_STATE, recorder.handler());
        bus.subscribe(ENTER_STATE, recorder.handler());

        // Act
        bus.emit(EventKind::ChangeState(TransitionRequest::new(
            Arc::new(RecordingFactory::new("recording", log.clone())),
            json!({ "name": "shop" }),
        )));
        bus.drain(10);

        // Assert
        assert_eq!(recorder.event_types(), vec![EXIT_STATE, ENTER_STATE]);
        assert_eq!(adapter.current().map(|s| s.name), Some("shop".to_owned()));
        assert_eq!(adapter.depth(), 1);
    }

    fn push_panicking_on_exit(bus: &EventBus, log: &LifecycleLog, name: &str) {
        bus.emit(EventKind::PushState(TransitionRequest::new(
            Arc::new(
                RecordingFactory::new("recording", log.clone()).panicking_on(LifecycleCall::Exit),
            ),
            json!({ "name": name }),
        )));
    }

    #[test]
    fn test_change_state_completes_when_exit_panics() {
        // Arrange
        let bus = test_bus();
        let adapter = StateTransitionAdapter::install(&bus);
        let log = LifecycleLog::new();
        push_panicking_on_exit(&bus, &log, "dialogue");
        bus.drain(10);
        let recorder = EventRecorder::new();
        bus.subscribe(WILDCARD, recorder.handler());

        // Act
        bus.emit(EventKind::ChangeState(TransitionRequest::new(
            Arc::new(RecordingFactory::new("recording", log.clone())),
            json!({ "name": "shop" }),
        )));
        bus.drain(10);

        // Assert
        assert_eq!(
            recorder.event_types(),
            vec!["change_state", EXIT_STATE, ENTER_STATE]
        );
        assert_eq!(adapter.current().map(|s| s.name), Some("shop".to_owned()));
        assert_eq!(adapter.depth(), 1);
        assert_eq!(bus.stats().handler_faults, 0);
    }

    #[test]
    fn test_pop_completes_and_announces_shutdown_when_exit_panics() {
        // Arrange
        let bus = test_bus();
        let adapter = StateTransitionAdapter::install(&bus);
        let log = LifecycleLog::new();
        push_panicking_on_exit(&bus, &log, "dialogue");
        bus.drain(10);
        let recorder = EventRecorder::new();
        bus.subscribe(WILDCARD, recorder.handler());

        // Act
        bus.emit(EventKind::PopState);
        bus.drain(10);

        // Assert
        assert_eq!(recorder.event_types(), vec!["pop_state", EXIT_STATE, SHUTDOWN]);
        assert!(!adapter.is_active());
        assert_eq!(log.count("dialogue", LifecycleCall::Exit), 1);
    }

    #[test]
    fn test_tick_updates_only_current_state() {
        let bus = test_bus();
        let _adapter = StateTransitionAdapter::install(&bus);
        let log = LifecycleLog::new();
        push(&bus, &log, "A");
        push(&bus, &log, "B");
        bus.drain(10);

        bus.emit(EventKind::Tick {
            dt: Duration::from_millis(16),
        });
        bus.drain(10);

        assert_eq!(log.count("B", LifecycleCall::Update), 1);
        assert_eq!(log.count("A", LifecycleCall::Update), 0);
    }

    /// Pushes a follow-up state synchronously from its own `enter` hook.
    struct EagerState {
        bus: WeakEventBus,
        follow_up: Option<TransitionRequest>,
    }

    impl ActiveState for EagerState {
        fn name(&self) -> &str {
            "eager"
        }

        fn enter(&mut self, _ctx: &StateContext) -> Result<(), StateError> {
            if let (Some(bus), Some(request)) = (self.bus.upgrade(), self.follow_up.take()) {
                bus.emit_immediate(EventKind::PushState(request));
            }
            Ok(())
        }

        fn update(&mut self, _ctx: &StateContext, _dt: Duration) -> Result<(), StateError> {
            Ok(())
        }
    }

    struct EagerFactory {
        bus: WeakEventBus,
        follow_up: TransitionRequest,
        used: AtomicBool,
    }

    impl StateFactory for EagerFactory {
        fn name(&self) -> &str {
            "eager"
        }

        fn create(&self, _params: &Value) -> Result<Box<dyn ActiveState>, StateError> {
            let first = !self.used.swap(true, Ordering::SeqCst);
            Ok(Box::new(EagerState {
                bus: self.bus.clone(),
                follow_up: first.then(|| self.follow_up.clone()),
            }))
        }
    }

    #[test]
    fn test_immediate_transition_from_hook_is_requeued() {
        // Arrange
        let bus = test_bus();
        let adapter = StateTransitionAdapter::install(&bus);
        let log = LifecycleLog::new();
        let factory = EagerFactory {
            bus: bus.downgrade(),
            follow_up: TransitionRequest::new(
                Arc::new(RecordingFactory::new("recording", log.clone())),
                json!({ "name": "follow-up" }),
            ),
            used: AtomicBool::new(false),
        };

        // Act
        bus.emit(EventKind::PushState(TransitionRequest::without_params(
            Arc::new(factory),
        )));
        bus.drain(10);

        // Assert
        let names: Vec<String> = adapter.states().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["eager", "follow-up"]);
        assert_eq!(bus.stats().handler_faults, 0);
    }

    #[test]
    fn test_snapshot_and_restore_through_adapter() {
        // Arrange
        let bus = test_bus();
        let adapter = StateTransitionAdapter::install(&bus);
        let log = LifecycleLog::new();
        let mut registry = StateRegistry::new();
        registry.register(Arc::new(RecordingFactory::new("recording", log.clone())));
        push(&bus, &log, "world");
        push(&bus, &log, "menu");
        bus.drain(10);
        let snapshot = adapter.snapshot().unwrap();
        bus.emit(EventKind::PopState);
        bus.drain(10);

        // Act
        let restored = adapter.restore(&snapshot, &registry).unwrap();

        // Assert
        assert_eq!(adapter.states(), restored);
        let names: Vec<String> = restored.into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["world", "menu"]);
    }

    #[test]
    fn test_dropping_adapter_unsubscribes() {
        let bus = test_bus();
        let adapter = StateTransitionAdapter::install(&bus);
        assert!(bus.has_subscribers(PUSH_STATE));

        drop(adapter);

        assert!(!bus.has_subscribers(PUSH_STATE));
        assert!(!bus.has_subscribers(TICK));
    }
}
