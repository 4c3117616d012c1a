//! `ActiveState` and `StateFactory` doubles that record their
//! lifecycle.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Value, json};
use tickstack_core::error::StateError;
use tickstack_core::state::{ActiveState, StateContext, StateFactory};

/// A lifecycle hook invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleCall {
    /// `ActiveState::enter`
    Enter,
    /// `ActiveState::exit`
    Exit,
    /// `ActiveState::pause`
    Pause,
    /// `ActiveState::resume`
    Resume,
    /// `ActiveState::update`
    Update,
}

/// Shared, ordered log of lifecycle calls across any number of states.
#[derive(Debug, Clone, Default)]
pub struct LifecycleLog {
    calls: Arc<Mutex<Vec<(String, LifecycleCall)>>>,
}

impl LifecycleLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, state: &str, call: LifecycleCall) {
        self.calls.lock().unwrap().push((state.to_owned(), call));
    }

    /// Returns every recorded `(state name, call)` pair in order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn calls(&self) -> Vec<(String, LifecycleCall)> {
        self.calls.lock().unwrap().clone()
    }

    /// Returns the calls received by the named state, in order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn calls_for(&self, state: &str) -> Vec<LifecycleCall> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| name == state)
            .map(|(_, call)| *call)
            .collect()
    }

    /// Counts how often the named state received `call`.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn count(&self, state: &str, call: LifecycleCall) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, c)| name == state && *c == call)
            .count()
    }
}

/// A state that logs every hook and can be told to fail specific hooks.
#[derive(Debug)]
pub struct RecordingState {
    name: String,
    log: LifecycleLog,
    failing: Vec<LifecycleCall>,
    panicking: Vec<LifecycleCall>,
    ticks: u64,
}

impl RecordingState {
    /// Create a state that records into `log`.
    #[must_use]
    pub fn new(name: impl Into<String>, log: LifecycleLog) -> Self {
        Self {
            name: name.into(),
            log,
            failing: Vec::new(),
            panicking: Vec::new(),
            ticks: 0,
        }
    }

    /// Makes `call` return an error (after it has been logged).
    #[must_use]
    pub fn failing_on(mut self, call: LifecycleCall) -> Self {
        self.failing.push(call);
        self
    }

    /// Makes `call` panic (after it has been logged).
    #[must_use]
    pub fn panicking_on(mut self, call: LifecycleCall) -> Self {
        self.panicking.push(call);
        self
    }

    fn hook(&self, call: LifecycleCall) -> Result<(), StateError> {
        self.log.record(&self.name, call);
        assert!(
            !self.panicking.contains(&call),
            "{} panicked on {call:?}",
            self.name
        );
        if self.failing.contains(&call) {
            return Err(StateError::Hook(format!("{} failed on {call:?}", self.name)));
        }
        Ok(())
    }
}

impl ActiveState for RecordingState {
    fn name(&self) -> &str {
        &self.name
    }

    fn enter(&mut self, _ctx: &StateContext) -> Result<(), StateError> {
        self.hook(LifecycleCall::Enter)
    }

    fn exit(&mut self, _ctx: &StateContext) -> Result<(), StateError> {
        self.hook(LifecycleCall::Exit)
    }

    fn pause(&mut self, _ctx: &StateContext) -> Result<(), StateError> {
        self.hook(LifecycleCall::Pause)
    }

    fn resume(&mut self, _ctx: &StateContext) -> Result<(), StateError> {
        self.hook(LifecycleCall::Resume)
    }

    fn update(&mut self, _ctx: &StateContext, _dt: Duration) -> Result<(), StateError> {
        self.ticks += 1;
        self.hook(LifecycleCall::Update)
    }

    fn serialize(&self) -> Result<Value, StateError> {
        Ok(json!({ "name": self.name, "ticks": self.ticks }))
    }
}

/// Builds `RecordingState`s that share one `LifecycleLog`.
///
/// The state's name is taken from a `"name"` parameter when present,
/// otherwise from the factory name.
#[derive(Debug, Clone)]
pub struct RecordingFactory {
    name: String,
    log: LifecycleLog,
    failing: Vec<LifecycleCall>,
    panicking: Vec<LifecycleCall>,
}

impl RecordingFactory {
    /// Create a factory recording into `log`.
    #[must_use]
    pub fn new(name: impl Into<String>, log: LifecycleLog) -> Self {
        Self {
            name: name.into(),
            log,
            failing: Vec::new(),
            panicking: Vec::new(),
        }
    }

    /// Every state built by this factory fails on `call`.
    #[must_use]
    pub fn failing_on(mut self, call: LifecycleCall) -> Self {
        self.failing.push(call);
        self
    }

    /// Every state built by this factory panics on `call`.
    #[must_use]
    pub fn panicking_on(mut self, call: LifecycleCall) -> Self {
        self.panicking.push(call);
        self
    }

    fn build(&self, name: &str) -> RecordingState {
        let mut state = RecordingState::new(name, self.log.clone());
        state.failing.clone_from(&self.failing);
        state.panicking.clone_from(&self.panicking);
        state
    }
}

impl StateFactory for RecordingFactory {
    fn name(&self) -> &str {
        &self.name
    }

    fn create(&self, params: &Value) -> Result<Box<dyn ActiveState>, StateError> {
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or(&self.name);
        Ok(Box::new(self.build(name)))
    }

    fn deserialize(&self, blob: &Value) -> Result<Box<dyn ActiveState>, StateError> {
        let name = blob
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| StateError::Serialization("missing name".into()))?;
        let mut state = self.build(name);
        state.ticks = blob.get("ticks").and_then(Value::as_u64).unwrap_or(0);
        Ok(Box::new(state))
    }
}

/// A factory whose construction always fails with invalid parameters.
#[derive(Debug, Clone)]
pub struct FailingFactory(pub String);

impl StateFactory for FailingFactory {
    fn name(&self) -> &str {
        &self.0
    }

    fn create(&self, _params: &Value) -> Result<Box<dyn ActiveState>, StateError> {
        Err(StateError::InvalidParams("construction refused".into()))
    }
}

/// A factory that yields no state at all.
#[derive(Debug, Clone)]
pub struct EmptyFactory(pub String);

impl StateFactory for EmptyFactory {
    fn name(&self) -> &str {
        &self.0
    }

    fn create(&self, _params: &Value) -> Result<Box<dyn ActiveState>, StateError> {
        Err(StateError::NoState)
    }
}
