//! States shipped with the host binary.
//!
//! `idle` keeps the scheduler alive and counts frames. `countdown` pops
//! itself after a number of frames, which is enough to exercise every
//! transition from a client.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tickstack_core::error::StateError;
use tickstack_core::event::EventKind;
use tickstack_core::state::{ActiveState, StateContext, StateFactory};
use tickstack_state::StateRegistry;
use tracing::debug;

/// Factory name of [`IdleState`].
pub const IDLE: &str = "idle";

/// Factory name of [`CountdownState`].
pub const COUNTDOWN: &str = "countdown";

/// Does nothing but count frames.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct IdleState {
    frames: u64,
}

impl ActiveState for IdleState {
    fn name(&self) -> &str {
        IDLE
    }

    fn update(&mut self, _ctx: &StateContext, _dt: Duration) -> Result<(), StateError> {
        self.frames += 1;
        Ok(())
    }

    fn serialize(&self) -> Result<Value, StateError> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Builds [`IdleState`].
#[derive(Debug, Clone, Copy, Default)]
pub struct IdleFactory;

impl StateFactory for IdleFactory {
    fn name(&self) -> &str {
        IDLE
    }

    fn create(&self, _params: &Value) -> Result<Box<dyn ActiveState>, StateError> {
        Ok(Box::new(IdleState::default()))
    }

    fn deserialize(&self, blob: &Value) -> Result<Box<dyn ActiveState>, StateError> {
        let state: IdleState = serde_json::from_value(blob.clone())?;
        Ok(Box::new(state))
    }
}

/// Pops itself once `remaining` frames have passed.
#[derive(Debug, Serialize, Deserialize)]
pub struct CountdownState {
    remaining: u64,
}

impl ActiveState for CountdownState {
    fn name(&self) -> &str {
        COUNTDOWN
    }

    fn update(&mut self, ctx: &StateContext, _dt: Duration) -> Result<(), StateError> {
        if self.remaining == 0 {
            return Ok(());
        }
        self.remaining -= 1;
        if self.remaining == 0 {
            debug!(state_id = %ctx.state_id(), "countdown finished");
            ctx.emit(EventKind::PopState);
        }
        Ok(())
    }

    fn serialize(&self) -> Result<Value, StateError> {
        Ok(serde_json::to_value(self)?)
    }
}

#[derive(Debug, Deserialize)]
struct CountdownParams {
    ticks: u64,
}

/// Builds [`CountdownState`] from `{"ticks": n}` with `n > 0`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CountdownFactory;

impl StateFactory for CountdownFactory {
    fn name(&self) -> &str {
        COUNTDOWN
    }

    fn create(&self, params: &Value) -> Result<Box<dyn ActiveState>, StateError> {
        let params: CountdownParams = serde_json::from_value(params.clone())
            .map_err(|e| StateError::InvalidParams(e.to_string()))?;
        if params.ticks == 0 {
            return Err(StateError::InvalidParams("ticks must be positive".into()));
        }
        Ok(Box::new(CountdownState {
            remaining: params.ticks,
        }))
    }

    fn deserialize(&self, blob: &Value) -> Result<Box<dyn ActiveState>, StateError> {
        let state: CountdownState = serde_json::from_value(blob.clone())?;
        Ok(Box::new(state))
    }
}

/// Returns a registry holding every built-in factory.
#[must_use]
pub fn registry() -> StateRegistry {
    let mut registry = StateRegistry::new();
    registry.register(Arc::new(IdleFactory));
    registry.register(Arc::new(CountdownFactory));
    registry
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tickstack_test_support::RecordingSink;
    use uuid::Uuid;

    use super::*;

    fn context(sink: &RecordingSink) -> StateContext {
        StateContext::new(Uuid::new_v4(), Arc::new(sink.clone()))
    }

    #[test]
    fn test_registry_holds_builtin_factories() {
        assert_eq!(registry().names(), vec![COUNTDOWN, IDLE]);
    }

    #[test]
    fn test_countdown_pops_itself_once() {
        // Arrange
        let sink = RecordingSink::new();
        let ctx = context(&sink);
        let mut state = CountdownFactory.create(&json!({ "ticks": 2 })).unwrap();

        // Act
        for _ in 0..4 {
            state.update(&ctx, Duration::from_millis(16)).unwrap();
        }

        // Assert
        assert_eq!(sink.event_types(), vec!["pop_state"]);
    }

    #[test]
    fn test_countdown_rejects_zero_or_missing_ticks() {
        assert!(matches!(
            CountdownFactory.create(&json!({ "ticks": 0 })),
            Err(StateError::InvalidParams(_))
        ));
        assert!(matches!(
            CountdownFactory.create(&Value::Null),
            Err(StateError::InvalidParams(_))
        ));
    }

    #[test]
    fn test_idle_state_round_trips_through_factory() {
        let sink = RecordingSink::new();
        let ctx = context(&sink);
        let mut state = IdleFactory.create(&Value::Null).unwrap();
        state.update(&ctx, Duration::from_millis(16)).unwrap();

        let blob = state.serialize().unwrap();
        let restored = IdleFactory.deserialize(&blob).unwrap();

        assert_eq!(blob, json!({ "frames": 1 }));
        assert_eq!(restored.serialize().unwrap(), blob);
    }
}
