//! Runtime error types.

use thiserror::Error;

/// Top-level error type for transitions, snapshots and scheduler control.
///
/// None of these conditions is fatal to the process; callers log them and
/// carry on.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A transition request could not be applied (for example, a pop on an
    /// empty stack).
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    /// A state factory failed to produce a state.
    #[error("state factory `{factory}` failed: {source}")]
    StateConstruction {
        /// Name of the factory that failed.
        factory: String,
        /// The underlying state error.
        #[source]
        source: StateError,
    },

    /// A snapshot referenced a factory that is not registered.
    #[error("unknown state factory: {0}")]
    UnknownFactory(String),

    /// A stack snapshot could not be taken or restored.
    #[error("snapshot error: {0}")]
    Snapshot(String),

    /// The scheduler was asked to do something its current phase forbids.
    #[error("scheduler error: {0}")]
    SchedulerState(String),

    /// A configuration value is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Error raised by an active state's lifecycle hooks or by a state factory.
#[derive(Debug, Error)]
pub enum StateError {
    /// The factory produced no state.
    #[error("factory produced no state")]
    NoState,

    /// Construction parameters were rejected.
    #[error("invalid state parameters: {0}")]
    InvalidParams(String),

    /// A lifecycle hook (`enter`, `exit`, `pause`, `resume`, `update`) failed.
    #[error("lifecycle hook failed: {0}")]
    Hook(String),

    /// The state could not be serialized or deserialized.
    #[error("state serialization failed: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StateError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Error returned by an event-bus callback.
///
/// The bus logs and counts handler errors; they never reach the emitter.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self(message.to_owned())
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self(message)
    }
}

impl From<StateError> for HandlerError {
    fn from(err: StateError) -> Self {
        Self(err.to_string())
    }
}

impl From<CoreError> for HandlerError {
    fn from(err: CoreError) -> Self {
        Self(err.to_string())
    }
}
